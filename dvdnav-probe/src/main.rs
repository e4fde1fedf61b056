//! # dvdnav-probe
//!
//! Reads a VIDEO_TS tree, prints its title layout as JSON and optionally
//! walks the navigation of one title, logging every event.
//!
//! ## Usage
//! ```bash
//! dvdnav-probe /media/dvd
//! dvdnav-probe /media/dvd --play 2 --events 500
//! RUST_LOG=dvdnav=debug dvdnav-probe /media/dvd --config player.json --play 1
//! ```

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use dvdnav_core::{load_disc, summarize, DirSource, Event, NavConfig, Navigator};
use tracing::{info, warn};

const USAGE: &str = "usage: dvdnav-probe <disc-root> [--config FILE] [--play TITLE] [--events N]";

struct Args {
    root: String,
    config: Option<String>,
    play: Option<u16>,
    events: usize,
}

fn parse_args() -> Result<Option<Args>> {
    let mut args = std::env::args().skip(1);
    let Some(root) = args.next() else {
        return Ok(None);
    };
    if root == "-h" || root == "--help" {
        return Ok(None);
    }

    let mut parsed = Args {
        root,
        config: None,
        play: None,
        events: 1000,
    };
    while let Some(flag) = args.next() {
        let value = args.next().with_context(|| format!("{flag} needs a value"))?;
        match flag.as_str() {
            "--config" => parsed.config = Some(value),
            "--play" => parsed.play = Some(value.parse().with_context(|| format!("bad title {value:?}"))?),
            "--events" => parsed.events = value.parse().with_context(|| format!("bad event count {value:?}"))?,
            other => bail!("unknown option {other}\n{USAGE}"),
        }
    }
    Ok(Some(parsed))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dvdnav=info".parse()?)
        )
        .with_writer(io::stderr)
        .init();

    let Some(args) = parse_args()? else {
        println!("{USAGE}");
        return Ok(());
    };

    let config = match &args.config {
        Some(path) => NavConfig::load(path)?,
        None => NavConfig::default(),
    };

    let source = Arc::new(DirSource::open(&args.root).await?);
    let policy = config.policy();
    let disc = load_disc(source.as_ref(), policy.as_ref()).await?;
    let summary = summarize(&disc, policy.as_ref())?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(title) = args.play {
        play(source, config, title, args.events).await?;
    }
    Ok(())
}

async fn play(source: Arc<DirSource>, config: NavConfig, title: u16, limit: usize) -> Result<()> {
    info!("dvdnav-probe v{} playing title {}", env!("CARGO_PKG_VERSION"), title);
    let mut nav = Navigator::open(source, config).await?;
    let mut jumped = false;

    for _ in 0..limit {
        let event = nav.next_event().await?;
        match &event {
            Event::Stop => {
                info!("stop");
                return Ok(());
            }
            Event::CellChange(cell) => info!(
                "cell {} of program {} ({} ticks)",
                cell.cell_n, cell.pg_n, cell.cell_length
            ),
            Event::VtsChange { old_vts, new_vts, domain } => {
                info!("title set {} -> {} ({:?})", old_vts, new_vts, domain)
            }
            Event::NavPacket(packet) => tracing::debug!("nav packet at sector {}", packet.sector),
            Event::Wait => nav.skip_wait(),
            Event::StillFrame { length } => {
                info!("still frame ({}s)", length);
                nav.skip_still();
            }
            other => info!("{}", other.name()),
        }

        if !jumped {
            jumped = true;
            if !nav.vm_mut().jump_title_part(title, 1)? {
                warn!("title {} is not reachable from here", title);
                bail!("no title {title}");
            }
        }
    }
    info!("stopped after {} events", limit);
    Ok(())
}
