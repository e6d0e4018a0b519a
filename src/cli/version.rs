/// Display version information
pub fn execute() {
    println!("warden {}", env!("CARGO_PKG_VERSION"));
    println!("Community integrity protection and disaster recovery engine");
}
