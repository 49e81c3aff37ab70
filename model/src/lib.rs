/*!
 * flotilla-model holds the deploy descriptor types and the concurrent deploy
 * engine: the per-host session, the worker pool, and the transport seam that
 * the ssh2-backed production transport and the test fakes both implement.
 */

pub mod descriptor;
pub mod error;
pub mod logging;
pub mod outcome;
pub mod pool;
pub mod session;
pub mod transport;

pub use crate::descriptor::{Descriptor, FilePair, ParseMode};
pub use crate::outcome::Outcome;
pub use crate::session::{DeployConfig, DeployRunner};
pub use crate::transport::Transport;
