//! Version command - show version information

/// Print version information
///
/// With `verbose`, also prints build details.
pub fn print_version(verbose: bool) {
    println!("{} {}", crate::NAME, crate::VERSION);

    if verbose {
        println!();
        println!("Commands:");
        for spec in crate::command::COMMANDS {
            println!("  - {}", spec.verb);
        }
        println!();
        println!("Build info:");
        println!("  Target:    {}", std::env::consts::ARCH);
        println!("  OS:        {}", std::env::consts::OS);
        println!("  Rust:      {}", env!("RUSTC_VERSION"));
        if let Ok(exe) = std::env::current_exe() {
            println!("  Executable: {}", exe.display());
        }
    }
}
