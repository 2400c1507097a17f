//! Background Removal Studio CLI
//!
//! Command-line front end for the bgremove-studio orchestration library.

#[cfg(feature = "cli")]
use bgremove_studio::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
