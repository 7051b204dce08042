use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// BlinkDx review server arguments
#[derive(Debug, Parser)]
#[command(
    name = "blinkdx-review",
    version,
    about = "Review blink-kinematics analyses of uploaded patient videos"
)]
pub struct Cli {
    /// Analysis backend base URL
    #[arg(long)]
    pub api_base_url: Option<String>,

    /// Address to listen on
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Frames requested per batch when loading a video
    #[arg(long)]
    pub frame_batch_size: Option<usize>,

    /// Mark the session cookie as Secure
    #[arg(long)]
    pub secure_cookies: bool,

    /// JSON file with the accounts allowed to sign in
    #[arg(long)]
    pub users_file: Option<PathBuf>,
}
