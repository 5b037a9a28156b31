use crate::layout::{LayoutKind, Layouts};
use crate::midi::{channel, Channel, ChannelOutput, LogChannel, MidiChannel};
use crate::tracker::{Change, KeyStateTracker};
use crate::view;
use anyhow::{anyhow, bail};
use clap::ValueEnum;
use std::cell::Cell;
use std::io::{BufRead, Write};
use std::rc::Rc;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Scroll wheels fire in bursts; only the first signal of a burst counts.
pub const WHEEL_GAP: Duration = Duration::from_millis(200);

/// An output whose destination channel the user can switch.
pub trait Device: ChannelOutput {
  fn select_channel(&mut self, channel: Channel);
}

impl Device for MidiChannel {
  fn select_channel(&mut self, channel: Channel) {
    self.set_channel(channel);
  }
}

impl Device for LogChannel {
  fn select_channel(&mut self, channel: Channel) {
    self.set_channel(channel);
  }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
  Down(char),
  Up(char),
  Tap(Vec<char>),
  Blur,
  Octave(i32),
  Wheel(i32),
  Layout(LayoutKind),
  Channel(u8),
  Program(u16, u8),
  Show,
  Quit,
}

fn key(word: Option<&str>) -> anyhow::Result<char> {
  let word = word.ok_or_else(|| anyhow!("missing key"))?;
  let mut chars = word.chars();
  match (chars.next(), chars.next()) {
    (Some(c), None) => Ok(c),
    _ => bail!("expected a single key, got {:?}", word),
  }
}

/// Highest bank reachable with a 14-bit bank select.
pub const MAX_BANK: u16 = 0x3fff;

fn number<T: FromStr>(word: Option<&str>) -> anyhow::Result<T> {
  let word = word.ok_or_else(|| anyhow!("missing number"))?;
  word
    .trim_start_matches('+')
    .parse()
    .map_err(|_| anyhow!("invalid number {:?}", word))
}

impl FromStr for Command {
  type Err = anyhow::Error;
  fn from_str(line: &str) -> anyhow::Result<Self> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or_else(|| anyhow!("empty command"))?;
    let command = match verb {
      "down" => Self::Down(key(words.next())?),
      "up" => Self::Up(key(words.next())?),
      "tap" => Self::Tap(
        words
          .next()
          .ok_or_else(|| anyhow!("missing keys"))?
          .chars()
          .collect(),
      ),
      "blur" => Self::Blur,
      "octave" => Self::Octave(number(words.next())?),
      "wheel" => Self::Wheel(number(words.next())?),
      "layout" => {
        let name = words.next().ok_or_else(|| anyhow!("missing layout"))?;
        Self::Layout(<LayoutKind as ValueEnum>::from_str(name, true).map_err(|e| anyhow!(e))?)
      }
      "channel" => {
        let index: u8 = number(words.next())?;
        if channel(index).is_none() {
          bail!("no channel {}; channels are 0 to 15", index);
        }
        Self::Channel(index)
      }
      "program" => {
        let bank: u16 = number(words.next())?;
        let program: u8 = number(words.next())?;
        if bank > MAX_BANK {
          bail!("bank {} is above {}", bank, MAX_BANK);
        }
        if program > 127 {
          bail!("program {} is above 127", program);
        }
        Self::Program(bank, program)
      }
      "show" => Self::Show,
      "quit" => Self::Quit,
      _ => bail!("unknown command {:?}", verb),
    };
    if let Some(extra) = words.next() {
      bail!("unexpected {:?} after {}", extra, verb);
    }
    Ok(command)
  }
}

#[derive(Debug, Default)]
pub struct WheelDebounce {
  last: Option<Instant>,
}

impl WheelDebounce {
  /// Every signal restarts the quiet period, accepted or not.
  pub fn accept(&mut self, now: Instant) -> bool {
    let accepted = match self.last {
      Some(last) => now.saturating_duration_since(last) >= WHEEL_GAP,
      None => true,
    };
    self.last = Some(now);
    accepted
  }
}

pub struct Session<'a> {
  tracker: KeyStateTracker<'a>,
  layouts: &'a Layouts,
  wheel: WheelDebounce,
  changed: Rc<Cell<bool>>,
  follow: bool,
}

impl<'a> Session<'a> {
  /// With `follow`, the keyboard is redrawn after every command that changed it.
  pub fn new(mut tracker: KeyStateTracker<'a>, layouts: &'a Layouts, follow: bool) -> Self {
    let changed = Rc::new(Cell::new(false));
    let flag = changed.clone();
    tracker.subscribe(Box::new(move |_: &Change| flag.set(true)));
    Self {
      tracker,
      layouts,
      wheel: WheelDebounce::default(),
      changed,
      follow,
    }
  }

  pub fn tracker(&self) -> &KeyStateTracker<'a> {
    &self.tracker
  }

  /// Returns false once the session should end.
  pub fn handle<D, W>(
    &mut self,
    command: Command,
    now: Instant,
    out: &mut D,
    screen: &mut W,
  ) -> anyhow::Result<bool>
  where
    D: Device + ?Sized,
    W: Write,
  {
    match command {
      Command::Down(key) => self.tracker.on_key_down(key, out)?,
      Command::Up(key) => self.tracker.on_key_up(key, out)?,
      Command::Tap(keys) => {
        for key in keys {
          self.tracker.on_key_down(key, out)?;
          self.tracker.on_key_up(key, out)?;
        }
      }
      Command::Blur => self.tracker.on_deactivate(out)?,
      Command::Octave(delta) => self.tracker.set_octave_offset(delta),
      Command::Wheel(units) => {
        if units != 0 && self.wheel.accept(now) {
          // Scrolling down lowers the octave.
          self.tracker.set_octave_offset(if units > 0 { -1 } else { 1 });
        }
      }
      Command::Layout(kind) => {
        let layouts = self.layouts;
        self.tracker.set_layout(layouts.get(kind));
      }
      Command::Channel(index) => {
        let ch = channel(index).ok_or_else(|| anyhow!("no channel {}", index))?;
        out.select_channel(ch);
      }
      Command::Program(bank, program) => out.program_change(bank, program)?,
      Command::Show => writeln!(screen, "{}", view::render(&self.tracker))?,
      Command::Quit => return Ok(false),
    }
    if self.changed.replace(false) && self.follow {
      writeln!(screen, "{}", view::render(&self.tracker))?;
    }
    Ok(true)
  }

  /// Reads one command per line until `quit` or end of input, then silences
  /// everything. Silencing happens even when reading or sending failed.
  pub fn run<R, D, W>(&mut self, input: R, out: &mut D, screen: &mut W) -> anyhow::Result<()>
  where
    R: BufRead,
    D: Device + ?Sized,
    W: Write,
  {
    let played = self.play(input, out, screen);
    log::debug!("input closed: {}", self.tracker.describe());
    let silenced = self.tracker.on_deactivate(out);
    played.and(silenced)
  }

  fn play<R, D, W>(&mut self, input: R, out: &mut D, screen: &mut W) -> anyhow::Result<()>
  where
    R: BufRead,
    D: Device + ?Sized,
    W: Write,
  {
    for line in input.lines() {
      let line = line?;
      let line = line.trim();
      if line.is_empty() || line.starts_with('#') {
        continue;
      }
      let command = match line.parse::<Command>() {
        Ok(command) => command,
        Err(e) => {
          log::warn!("ignoring {:?}: {}", line, e);
          continue;
        }
      };
      if !self.handle(command, Instant::now(), out, screen)? {
        break;
      }
    }
    Ok(())
  }
}

#[cfg(test)]
impl Device for crate::tracker::Recorder {
  fn select_channel(&mut self, _channel: Channel) {}
}

#[test]
fn test_parse() {
  assert_eq!("down a".parse::<Command>().unwrap(), Command::Down('a'));
  assert_eq!("up ;".parse::<Command>().unwrap(), Command::Up(';'));
  assert_eq!(
    "tap zxc".parse::<Command>().unwrap(),
    Command::Tap(vec!['z', 'x', 'c'])
  );
  assert_eq!("octave +1".parse::<Command>().unwrap(), Command::Octave(1));
  assert_eq!("octave -2".parse::<Command>().unwrap(), Command::Octave(-2));
  assert_eq!("wheel 3".parse::<Command>().unwrap(), Command::Wheel(3));
  assert_eq!(
    "layout whole-tone".parse::<Command>().unwrap(),
    Command::Layout(LayoutKind::WholeTone)
  );
  assert_eq!(
    "program 1 24".parse::<Command>().unwrap(),
    Command::Program(1, 24)
  );
  assert_eq!("  blur ".parse::<Command>().unwrap(), Command::Blur);
  assert!("down ab".parse::<Command>().is_err());
  assert!("down".parse::<Command>().is_err());
  assert!("layout dorian".parse::<Command>().is_err());
  assert!("channel x".parse::<Command>().is_err());
  assert!("show me".parse::<Command>().is_err());
  assert!("strum".parse::<Command>().is_err());
}

#[test]
fn test_parse_rejects_out_of_range_numbers() {
  assert_eq!("channel 15".parse::<Command>().unwrap(), Command::Channel(15));
  assert!("channel 16".parse::<Command>().is_err());
  assert!("channel 255".parse::<Command>().is_err());
  assert_eq!(
    "program 16383 127".parse::<Command>().unwrap(),
    Command::Program(16383, 127)
  );
  assert!("program 0 128".parse::<Command>().is_err());
  assert!("program 0 200".parse::<Command>().is_err());
  assert!("program 16384 0".parse::<Command>().is_err());
}

#[test]
fn test_wheel_debounce() {
  let start = Instant::now();
  let mut wheel = WheelDebounce::default();
  assert!(wheel.accept(start));
  assert!(!wheel.accept(start + Duration::from_millis(100)));
  // The rejected signal still restarts the gap.
  assert!(!wheel.accept(start + Duration::from_millis(250)));
  assert!(wheel.accept(start + Duration::from_millis(450)));
}

#[test]
fn test_session() {
  use crate::grid::{GridKind, KeyboardGrid};
  use crate::tracker::{Recorder, Sent, VELOCITY};
  let grid = KeyboardGrid::new(GridKind::Qwerty).unwrap();
  let layouts = Layouts::new(48).unwrap();
  let tracker = KeyStateTracker::new(&grid, layouts.get(LayoutKind::Chromatic));
  let mut session = Session::new(tracker, &layouts, false);
  let mut out = Recorder::default();
  let mut screen = Vec::new();
  let input = "down z\n# comment\nbogus\ndown z\nwheel -1\nwheel -1\ndown x\nlayout scale\nprogram 0 5\nshow\n";
  session
    .run(input.as_bytes(), &mut out, &mut screen)
    .unwrap();
  assert_eq!(
    out.0,
    vec![
      Sent::On(48, VELOCITY),
      Sent::On(61, VELOCITY),
      Sent::Program(0, 5),
      Sent::AllOff,
    ]
  );
  let screen = String::from_utf8(screen).unwrap();
  assert!(screen.starts_with("layout: Scale  octave: +1\n"));
  assert_eq!(session.tracker().active_notes().count(), 0);
}

#[test]
fn test_follow_redraws_on_change() {
  use crate::grid::KeyboardGrid;
  use crate::tracker::Recorder;
  let grid = KeyboardGrid::from_rows_top_down(vec!["a"]).unwrap();
  let layouts = Layouts::new(48).unwrap();
  let tracker = KeyStateTracker::new(&grid, layouts.get(LayoutKind::Chromatic));
  let mut session = Session::new(tracker, &layouts, true);
  let mut out = Recorder::default();
  let mut screen = Vec::new();
  let now = Instant::now();
  session
    .handle(Command::Up('a'), now, &mut out, &mut screen)
    .unwrap();
  assert!(screen.is_empty());
  session
    .handle(Command::Down('a'), now, &mut out, &mut screen)
    .unwrap();
  assert_eq!(
    String::from_utf8(screen).unwrap(),
    "layout: Chromatic  octave: +0\n[a:C4]\n"
  );
  assert!(!session
    .handle(Command::Quit, now, &mut out, &mut Vec::new())
    .unwrap());
}

#[test]
fn test_bad_channel_does_not_end_session() {
  use crate::grid::{GridKind, KeyboardGrid};
  use crate::tracker::{Recorder, Sent, VELOCITY};
  let grid = KeyboardGrid::new(GridKind::Qwerty).unwrap();
  let layouts = Layouts::new(48).unwrap();
  let tracker = KeyStateTracker::new(&grid, layouts.get(LayoutKind::Chromatic));
  let mut session = Session::new(tracker, &layouts, false);
  let mut out = Recorder::default();
  let input = "down z\nchannel 16\nprogram 0 200\ndown x\n";
  session
    .run(input.as_bytes(), &mut out, &mut Vec::new())
    .unwrap();
  assert_eq!(
    out.0,
    vec![Sent::On(48, VELOCITY), Sent::On(49, VELOCITY), Sent::AllOff]
  );
  assert_eq!(session.tracker().active_notes().count(), 0);
}

#[test]
fn test_failed_send_still_silences() {
  use crate::grid::{GridKind, KeyboardGrid};
  use crate::tracker::{Recorder, Sent, VELOCITY};
  use anyhow::Result;
  struct Flaky(Recorder);
  impl ChannelOutput for Flaky {
    fn note_on(&mut self, pitch: crate::theory::Pitch, velocity: u8) -> Result<()> {
      self.0.note_on(pitch, velocity)?;
      bail!("device unplugged")
    }
    fn note_off(&mut self, pitch: crate::theory::Pitch, velocity: u8) -> Result<()> {
      self.0.note_off(pitch, velocity)
    }
    fn all_notes_off(&mut self) -> Result<()> {
      self.0.all_notes_off()
    }
    fn program_change(&mut self, bank: u16, program: u8) -> Result<()> {
      self.0.program_change(bank, program)
    }
  }
  impl Device for Flaky {
    fn select_channel(&mut self, _channel: Channel) {}
  }
  let grid = KeyboardGrid::new(GridKind::Qwerty).unwrap();
  let layouts = Layouts::new(48).unwrap();
  let tracker = KeyStateTracker::new(&grid, layouts.get(LayoutKind::Chromatic));
  let mut session = Session::new(tracker, &layouts, false);
  let mut out = Flaky(Recorder::default());
  let result = session.run("down z\ndown x\n".as_bytes(), &mut out, &mut Vec::new());
  assert!(result.is_err());
  assert_eq!(out.0 .0, vec![Sent::On(48, VELOCITY), Sent::AllOff]);
  assert_eq!(session.tracker().active_notes().count(), 0);
}
