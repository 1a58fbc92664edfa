//! Line-oriented control surface.
//!
//! A reader thread parses stdin and forwards commands; the pipeline loop
//! drains them between frames so booth state is only touched there.

use std::io::BufRead;
use std::path::PathBuf;
use std::str::FromStr;
use std::thread;

use crossbeam_channel::{Receiver, Sender};

use crate::compositor::Filter;
use crate::error::BoothError;

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    ToggleEffect,
    ListBackgrounds,
    SelectBackground(u32),
    SelectBlur,
    Upload(PathBuf),
    SetFilter(Filter),
    Snap,
    Cancel,
    ListCameras,
    SwitchCamera(u32),
    ListPhotos,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  effect            toggle background effect
  backgrounds       list background options
  bg <id> | bg blur select a background (effect must be on)
  upload <path>     add an image as a background
  filter <css>      set filter, e.g. `filter sepia(1) contrast(1.2)` or `filter none`
  snap              start the countdown and take a photo
  cancel            abort a running countdown
  cameras           list cameras
  camera <index>    switch camera
  photos            list photos taken
  status            show effect, background, filter and countdown
  quit";

impl FromStr for Command {
    type Err = BoothError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let unknown = || BoothError::UnknownCommand(line.to_string());

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match (word.to_ascii_lowercase().as_str(), rest) {
            ("effect", "") => Command::ToggleEffect,
            ("backgrounds", "") => Command::ListBackgrounds,
            ("bg", "blur") => Command::SelectBlur,
            ("bg", id) => Command::SelectBackground(id.parse().map_err(|_| unknown())?),
            ("upload", path) if !path.is_empty() => Command::Upload(PathBuf::from(path)),
            ("filter", css) => Command::SetFilter(css.parse()?),
            ("snap", "") => Command::Snap,
            ("cancel", "") => Command::Cancel,
            ("cameras", "") => Command::ListCameras,
            ("camera", index) => Command::SwitchCamera(index.parse().map_err(|_| unknown())?),
            ("photos", "") => Command::ListPhotos,
            ("status", "") => Command::Status,
            ("help", "") => Command::Help,
            ("quit" | "exit", "") => Command::Quit,
            _ => return Err(unknown()),
        };
        Ok(command)
    }
}

/// Spawn the stdin reader. The channel closes when stdin does.
pub fn spawn_stdin_reader() -> std::io::Result<Receiver<Command>> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::Builder::new()
        .name("controls".to_string())
        .spawn(move || read_commands(std::io::stdin().lock(), &tx))?;
    Ok(rx)
}

fn read_commands<R: BufRead>(input: R, tx: &Sender<Command>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!("Failed to read control input: {}", err);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(command) => {
                if tx.send(command).is_err() {
                    break;
                }
            }
            Err(err) => tracing::warn!("{} (type `help` for commands)", err),
        }
    }
    tracing::debug!("Control input closed");
}
