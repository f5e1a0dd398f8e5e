//! `tgcp-launch`: start the virtual-environment interpreter next to this binary.
//!
//! Takes no arguments; anything passed is ignored.

fn main() {
    let err = tgcp_launch::run();
    eprintln!("tgcp-launch: {err}");
    std::process::exit(err.exit_code());
}
