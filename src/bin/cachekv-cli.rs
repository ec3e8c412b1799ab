//! cachekv-cli - send one command to a cachekv server
//!
//! ```text
//! $ cachekv-cli set name cachekv 60
//! OK
//! $ cachekv-cli get name
//! cachekv
//! ```
//!
//! The tokens are joined with single spaces, written in one go, and the first
//! reply read back (at most one buffer) is printed.

use anyhow::Context;
use cachekv::connection::DEFAULT_BUFFER_SIZE;
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Debug, Parser)]
#[command(name = "cachekv-cli", version, about = "Send one command to a cachekv server")]
struct Cli {
    /// Server host
    #[arg(long, default_value = cachekv::DEFAULT_HOST)]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = cachekv::DEFAULT_PORT)]
    port: u16,

    /// Command and arguments, e.g. `get name`
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let line = cli.command.join(" ");

    let mut stream = TcpStream::connect((cli.host.as_str(), cli.port))
        .await
        .with_context(|| format!("failed to connect to {}:{}", cli.host, cli.port))?;

    stream
        .write_all(line.as_bytes())
        .await
        .context("failed to send command")?;

    let mut buf = vec![0u8; DEFAULT_BUFFER_SIZE];
    let n = stream.read(&mut buf).await.context("failed to read reply")?;
    if n == 0 {
        anyhow::bail!("server closed the connection without replying");
    }

    let reply = String::from_utf8_lossy(&buf[..n]);
    println!("{}", reply);

    if reply.starts_with("ERROR:") {
        std::process::exit(1);
    }
    Ok(())
}
