use anyhow::Context;
use std::path::PathBuf;

pub(crate) struct Args {
    pub config_path: PathBuf,
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub encoder: Option<String>,
    pub framerate: Option<u32>,
    pub quality: Option<u32>,
    pub width: Option<u16>,
    pub height: Option<u16>,
}

pub(crate) fn parse_args() -> anyhow::Result<Args> {
    let mut config_path = PathBuf::from("./config/streamcast.toml");
    let mut bind = None;
    let mut port = None;
    let mut encoder = None;
    let mut framerate = None;
    let mut quality = None;
    let mut width = None;
    let mut height = None;

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-V" | "--version" => {
                println!("streamcast-agent {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "-h" | "--help" => {
                println!("streamcast-agent - H.264 capture ingestion and viewer fan-out agent");
                println!();
                println!("USAGE:");
                println!("    streamcast-agent [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!(
                    "    --config <PATH>        Config file [default: ./config/streamcast.toml]"
                );
                println!("    --bind <ADDR>           Bind address [default: 0.0.0.0]");
                println!("    --port <PORT>           Listen port [default: 9000]");
                println!("    --encoder <NAME>        Force encoder candidate (nvenc, x264)");
                println!("    --framerate <FPS>       Target framerate");
                println!("    --quality <VALUE>       Opaque quality hint passed to clients");
                println!("    --width <PIXELS>        Initial fallback width");
                println!("    --height <PIXELS>       Initial fallback height");
                println!("    -V, --version           Print version and exit");
                println!("    -h, --help              Print this help and exit");
                std::process::exit(0);
            }
            "--config" => {
                i += 1;
                config_path = PathBuf::from(args.get(i).context("Missing --config value")?);
            }
            "--bind" => {
                i += 1;
                bind = Some(args.get(i).context("Missing --bind value")?.clone());
            }
            "--port" => {
                i += 1;
                port = Some(
                    args.get(i)
                        .context("Missing --port value")?
                        .parse()
                        .context("Invalid --port value")?,
                );
            }
            "--encoder" => {
                i += 1;
                encoder = Some(args.get(i).context("Missing --encoder value")?.clone());
            }
            "--framerate" => {
                i += 1;
                framerate = Some(
                    args.get(i)
                        .context("Missing --framerate value")?
                        .parse()
                        .context("Invalid --framerate value")?,
                );
            }
            "--quality" => {
                i += 1;
                quality = Some(
                    args.get(i)
                        .context("Missing --quality value")?
                        .parse()
                        .context("Invalid --quality value")?,
                );
            }
            "--width" => {
                i += 1;
                width = Some(
                    args.get(i)
                        .context("Missing --width value")?
                        .parse()
                        .context("Invalid --width value")?,
                );
            }
            "--height" => {
                i += 1;
                height = Some(
                    args.get(i)
                        .context("Missing --height value")?
                        .parse()
                        .context("Invalid --height value")?,
                );
            }
            other => anyhow::bail!("Unknown argument: {other}"),
        }
        i += 1;
    }

    Ok(Args {
        config_path,
        bind,
        port,
        encoder,
        framerate,
        quality,
        width,
        height,
    })
}
