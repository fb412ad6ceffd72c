use clap::{Parser, Subcommand};
use fox_gallery::gallery::{
    FixedNumbers, Gallery, GalleryError, ImageNumberSource, KeyGenerator, RandomFoxes,
    RandomKeys,
};
use fox_gallery::testing::ManualObserver;
use fox_gallery::visibility::IntersectionEntry;
use fox_gallery::{config, output};
use std::path::PathBuf;
use std::rc::Rc;

/// Shared flags for commands that build a gallery.
#[derive(clap::Args, Clone)]
struct GalleryArgs {
    /// Number of foxes to add, at most 1000 (defaults to page.initial_count, or 6 if that is 0)
    #[arg(long)]
    count: Option<usize>,

    /// Seed for keys and fox numbers; omit for a different gallery each run
    #[arg(long)]
    seed: Option<u64>,

    /// Use these fox numbers in order instead of random ones
    #[arg(long, value_delimiter = ',')]
    numbers: Vec<u32>,
}

#[derive(Parser)]
#[command(name = "fox-gallery")]
#[command(about = "A fox photo gallery that loads each image once it scrolls into view")]
#[command(long_about = "\
A fox photo gallery that loads each image once it scrolls into view

Each fox starts as an embedded blank placeholder. The real image URL is
swapped in the first time its surface is reported visible.

  render    writes the page as HTML with every fox still on its placeholder
  simulate  drives a scripted visibility host and prints each loader's state

Logging goes to stderr; set RUST_LOG=debug to follow subscriptions.
Run 'fox-gallery gen-config' to generate a documented gallery.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = "gallery.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the gallery page as static HTML
    Render {
        #[command(flatten)]
        gallery: GalleryArgs,

        /// Output file
        #[arg(long, default_value = "gallery.html")]
        output: PathBuf,
    },
    /// Mount a gallery against a scripted visibility host
    Simulate {
        #[command(flatten)]
        gallery: GalleryArgs,

        /// 1-based positions reported visible, in one batch
        #[arg(long, value_delimiter = ',')]
        visible: Vec<usize>,

        /// 1-based positions unmounted before visibility is reported
        #[arg(long, value_delimiter = ',')]
        unmount: Vec<usize>,

        /// Print item states as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a stock gallery.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Render {
            gallery,
            output: out_path,
        } => {
            let config = config::load_config(&cli.config)?;
            let host = Rc::new(ManualObserver::new());
            let mut page = build_gallery(&config, host, &gallery)?;
            page.commit();
            std::fs::write(&out_path, page.render_page().into_string())?;
            output::print_render_output(&out_path, page.len());
        }
        Command::Simulate {
            gallery,
            visible,
            unmount,
            json,
        } => {
            let config = config::load_config(&cli.config)?;
            let host = Rc::new(ManualObserver::new());
            let mut page = build_gallery(&config, host.clone(), &gallery)?;
            page.commit();

            // Resolve every position before anything is removed.
            let doomed = unmount
                .iter()
                .map(|&pos| page.key_at(pos))
                .collect::<Result<Vec<_>, _>>()?;
            let batch = visible
                .iter()
                .map(|&pos| -> Result<Option<IntersectionEntry>, GalleryError> {
                    let key = page.key_at(pos)?;
                    Ok(page.surface_of(key).map(IntersectionEntry::visible))
                })
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .flatten()
                .collect::<Vec<_>>();

            for key in doomed {
                page.remove(key);
            }
            if !batch.is_empty() {
                host.dispatch(&batch);
            }
            page.commit();

            if json {
                println!("{}", serde_json::to_string_pretty(&page.status())?);
            } else {
                output::print_status(&page.status());
                println!("Active subscriptions: {}", host.active_subscriptions());
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Build a gallery from config and flags, then add the requested foxes.
fn build_gallery(
    config: &config::GalleryConfig,
    host: Rc<ManualObserver>,
    args: &GalleryArgs,
) -> Result<Gallery, Box<dyn std::error::Error>> {
    let max = config.source.max_image_number;
    let keys: Box<dyn KeyGenerator> = match args.seed {
        Some(seed) => Box::new(RandomKeys::seeded(seed)),
        None => Box::new(RandomKeys::from_os_rng()),
    };
    let numbers: Box<dyn ImageNumberSource> = if !args.numbers.is_empty() {
        Box::new(FixedNumbers::new(args.numbers.clone())?)
    } else if let Some(seed) = args.seed {
        Box::new(RandomFoxes::seeded(seed.wrapping_add(1), max))
    } else {
        Box::new(RandomFoxes::from_os_rng(max))
    };

    let count = config.resolve_count(args.count)?;
    let mut gallery = Gallery::new(config.clone(), host, keys, numbers);
    for _ in 0..count {
        gallery.add_new_fox()?;
    }
    Ok(gallery)
}
