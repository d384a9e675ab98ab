//! Startup banner and shutdown summary display.

use crate::config::GatewayConfig;
use crate::consts::{AUTHOR, HOMEPAGE, REPO, format_duration, format_number};
use crate::handler::StatsSnapshot;

/// Print the startup banner with the effective configuration.
pub fn print_banner(config: &GatewayConfig) {
    let solver_status = if config.solver_present() {
        "found"
    } else {
        "missing"
    };
    println!(
        r#"
   ╔═══════════════════════════════════════╗
   ║          D R O N E G A T E            ║
   ║   grid problems in, flight plans out  ║
   ╚═══════════════════════════════════════╝

   version   {}
   by        {}
   home      {}
   repo      {}
   listen    {}
   solver    {} ({})
   timeout   {}
   slots     {}
   max input {} bytes
"#,
        env!("CARGO_PKG_VERSION"),
        AUTHOR,
        HOMEPAGE,
        REPO,
        config.bind,
        config.solver_path.display(),
        solver_status,
        format_duration(config.solver_timeout),
        config.max_concurrent,
        format_number(config.max_input_bytes as u64),
    );
}

/// One-line summary of a run, e.g. `12 requests: 9 ok, 2 rejected, 1 failed`.
pub fn summary_line(stats: StatsSnapshot) -> String {
    format!(
        "{} requests: {} ok, {} rejected, {} failed",
        format_number(stats.total()),
        format_number(stats.served),
        format_number(stats.rejected),
        format_number(stats.failed),
    )
}

/// Print the shutdown summary (request totals + farewell).
pub fn print_session_summary(stats: StatsSnapshot) {
    if stats.total() > 0 {
        println!("session: {}", summary_line(stats));
    }
    println!("goodbye.");
}
