//! Version command implementation.

use branchmesh_wire::PROTOCOL_VERSION;

/// Version information for the CLI.
const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

pub fn run() {
    println!("{NAME} {VERSION}");
    println!();
    println!("Replicated ledger simulation for studying session guarantees.");
    println!();
    println!("Build info:");
    println!("  Wire protocol: v{PROTOCOL_VERSION}");
    println!("  Target:        {}", std::env::consts::ARCH);
    println!("  OS:            {}", std::env::consts::OS);
}
