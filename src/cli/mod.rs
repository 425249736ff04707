mod enhance;
pub mod server;
mod status;
mod train;

pub use enhance::*;
pub use server::*;
pub use status::*;
pub use train::*;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}
