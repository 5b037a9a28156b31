use self::driver::{Device, Session};
use self::grid::{GridKind, KeyboardGrid};
use self::layout::{LayoutKind, Layouts};
use self::midi::{ChannelOutput, LogChannel, MidiChannel};
use self::tracker::KeyStateTracker;
use anyhow::anyhow;
use clap::Parser;
use log::LevelFilter;
use std::env;
use std::io;

mod driver;
mod grid;
mod layout;
mod midi;
mod theory;
mod tracker;
mod view;

/// Play a typing keyboard as a musical instrument.
///
/// Reads key events from stdin, one per line: `down <key>`, `up <key>`,
/// `tap <keys>`, `blur`, `octave <+n|-n>`, `wheel <units>`, `layout <name>`,
/// `channel <n>`, `program <bank> <program>`, `show`, `quit`.
/// Logging is controlled with RUST_LOG and defaults to Info.
#[derive(Parser)]
#[command(version, about, verbatim_doc_comment)]
struct Cli {
  /// Physical key arrangement
  #[arg(long, value_enum, default_value = "dvorak")]
  grid: GridKind,
  /// Initial layout
  #[arg(long, value_enum, default_value = "chromatic")]
  layout: LayoutKind,
  /// Pitch of the bottom left key in the chromatic and whole tone layouts
  #[arg(long, default_value_t = layout::DEFAULT_BASE, allow_negative_numbers = true)]
  base: theory::Pitch,
  /// Substring to match against midi output port names
  #[arg(long, default_value = "FLUID")]
  port: String,
  /// Zero-based midi channel
  #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..16))]
  channel: u8,
  #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u16).range(0..=0x3fff))]
  bank: u16,
  #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..128))]
  program: u8,
  /// Log notes instead of sending them to a midi port
  #[arg(long)]
  dry_run: bool,
  /// Redraw the keyboard after every change
  #[arg(long)]
  follow: bool,
  /// List midi output ports and exit
  #[arg(long)]
  list_ports: bool,
}

fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();

  let mut log_builder = env_logger::builder();
  if env::var("RUST_LOG").is_err() {
    log_builder.filter_level(LevelFilter::Info);
  }
  log_builder.init();

  if cli.list_ports {
    for name in midi::port_names()? {
      println!("{}", name);
    }
    return Ok(());
  }

  let grid = KeyboardGrid::new(cli.grid)?;
  let layouts = Layouts::new(cli.base)?;
  let channel = midi::channel(cli.channel).ok_or_else(|| anyhow!("no channel {}", cli.channel))?;
  let mut out: Box<dyn Device> = if cli.dry_run {
    Box::new(LogChannel::new(channel))
  } else {
    Box::new(MidiChannel::new(midi::connect(&cli.port)?, channel))
  };
  out.program_change(cli.bank, cli.program)?;

  let layout = layouts.get(cli.layout);
  log::info!("{:?} keyboard, {} layout", cli.grid, layout);
  let tracker = KeyStateTracker::new(&grid, layout);
  let mut session = Session::new(tracker, &layouts, cli.follow);
  let mut screen = io::stdout().lock();
  session.run(io::stdin().lock(), &mut *out, &mut screen)
}
