use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;
use vmm::{Mmu, arch};

mod console;
mod scenario;

use console::Console;

#[derive(Parser)]
#[command(name = "vmsim")]
#[command(about = "Copy-on-write virtual memory simulator")]
struct Args {
    /// Number of physical frames in the simulated machine
    #[arg(short, long, default_value_t = 256)]
    frames: usize,

    /// Log more detail (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fork copy-on-write, then write through the parent and the child
    Cow {
        /// Number of pages to map before forking
        #[arg(short, long, default_value_t = 1)]
        pages: usize,
    },
    /// Fork eagerly, then show the child is isolated from the parent
    Eager {
        /// Number of pages to map before forking
        #[arg(short, long, default_value_t = 1)]
        pages: usize,
    },
    /// Map pages and print the page table
    Dump {
        /// Number of pages to map
        #[arg(short, long, default_value_t = 1)]
        pages: usize,
    },
}

fn level_filter(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    Console::init(level_filter(args.verbose))?;

    if args.frames > arch::MAX_PAGES {
        return Err(format!("--frames may not exceed {}", arch::MAX_PAGES).into());
    }

    let mut mmu = Mmu::new(args.frames)?;
    log::debug!("simulated machine with {} frames", args.frames);

    match args.command {
        Command::Cow { pages } => scenario::copy_on_write(&mut mmu, pages),
        Command::Eager { pages } => scenario::eager(&mut mmu, pages),
        Command::Dump { pages } => scenario::dump(&mut mmu, pages),
    }
}
