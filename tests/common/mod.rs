use std::path::PathBuf;
use std::process::{Command, ExitStatus};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

pub fn run_cli(args: &[&str]) -> CmdResult {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_usbsweep"));
    let output = Command::new(bin)
        .args(args)
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute usbsweep command");

    CmdResult {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
}
