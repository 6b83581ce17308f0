use clap::Parser;
use gutenberg::config::BuildOptions;
use gutenberg::generate::Book;
use gutenberg::highlight::SourceHighlight;
use gutenberg::markdown::BookMarkdown;
use gutenberg::output;
use gutenberg::serve::{DEFAULT_PORT, DevServer};
use gutenberg::watch::{self, Regenerator};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "gutenberg")]
#[command(about = "Static book generator: markdown chapters in, HTML book out")]
#[command(long_about = "\
Static book generator: markdown chapters in, HTML book out

The config file lists the chapters in reading order, the layouts wrapping
them, navigation indexes handed to the layouts, and assets copied next to
the generated pages.

Book structure:

  book/
  ├── config.json          # Output dir, table of contents, layouts, indexes
  ├── layouts/
  │   ├── page.html        # Wraps every chapter: {{.Page}}
  │   └── index.html       # Optional index page
  ├── css/style.css        # Asset → copied to out/style.css
  ├── intro.md             # → out/intro.html
  └── chapters/one.md      # → out/chapters/one.html

With --watch the inputs are polled every --interval milliseconds. A change
to config.json or a layout regenerates everything; a changed chapter or
asset regenerates only itself.

Fenced code blocks are highlighted with GNU source-highlight when it is on
PATH. Set RUST_LOG=debug for more detail.")]
#[command(version)]
struct Cli {
    /// Config file, relative to the source directory
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Book source directory
    #[arg(short, long, default_value = ".")]
    source: PathBuf,

    /// Keep running and regenerate on changes
    #[arg(short, long)]
    watch: bool,

    /// Serve the output directory over HTTP
    #[arg(short = 'S', long)]
    server: bool,

    /// Dev server port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Watch polling interval in milliseconds
    #[arg(short, long, value_name = "MS", default_value_t = 1000)]
    interval: u64,
}

impl Cli {
    fn build_options(&self) -> BuildOptions {
        BuildOptions {
            source: self.source.clone(),
            config: self.config.clone(),
            interval: Duration::from_millis(self.interval),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let options = cli.build_options();
    log::debug!("using config {}", options.config_path().display());

    let markdown = BookMarkdown::new(SourceHighlight::detect());
    let mut regenerator = Regenerator::new(options.clone(), markdown);
    if let Some(report) = regenerator.tick()? {
        output::print_pass_report(&report, &options.source);
    }

    if !cli.watch && !cli.server {
        return Ok(());
    }

    let server = if cli.server {
        let book = Book::load(&options)?;
        let server = DevServer::bind(&book.paths.output, cli.port)?;
        println!(
            "{}",
            output::format_serving(&server.addr().to_string(), server.root())
        );
        let shutdown = server.shutdown_handle();
        let handle = thread::Builder::new()
            .name("serve".into())
            .spawn(move || server.run())?;
        Some((shutdown, handle))
    } else {
        None
    };

    let watcher = if cli.watch {
        let root = options.source.clone();
        Some(watch::spawn(regenerator, move |report| {
            output::print_pass_report(report, &root)
        })?)
    } else {
        None
    };

    let stop = watcher.as_ref().map(|w| w.stop_handle());
    let shutdown = server.as_ref().map(|(s, _)| s.clone());
    ctrlc::set_handler(move || {
        log::info!("shutting down...");
        if let Some(stop) = &stop {
            stop.stop();
        }
        if let Some(shutdown) = &shutdown {
            shutdown.shutdown();
        }
    })?;

    // The watch loop ends on Ctrl+C or a fatal error; either way the server
    // goes down with it.
    let result = watcher.map(|w| w.join()).unwrap_or(Ok(()));
    if let Some((shutdown, handle)) = server {
        if result.is_err() {
            shutdown.shutdown();
        }
        handle.join().map_err(|_| "server thread panicked")?;
    }
    result?;
    Ok(())
}
