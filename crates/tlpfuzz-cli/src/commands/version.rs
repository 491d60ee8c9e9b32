const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn run() {
    println!("tlpfuzz {VERSION}");
    println!();
    println!("Coverage-guided ternary logic partitioning for SQL engines.");
    println!();
    println!("Build info:");
    println!("  Target: {}", std::env::consts::ARCH);
    println!("  OS:     {}", std::env::consts::OS);
}
