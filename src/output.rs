//! Terminal rendering of pipeline output frames.
//! Used by the `say` and `chat` commands.

use crate::frame::{ControlSignal, Frame};
use crate::pipeline::sink::{FrameSender, frame_queue};
use owo_colors::OwoColorize;
use tokio::task::JoinHandle;

/// Running totals over the frames a command produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FrameTally {
    pub frames: usize,
    pub text_frames: usize,
    pub audio_frames: usize,
    pub audio_bytes: usize,
    pub errors: usize,
}

impl FrameTally {
    pub fn record(&mut self, frame: &Frame) {
        self.frames += 1;
        match frame {
            Frame::Text { .. } => self.text_frames += 1,
            Frame::Audio { data, .. } => {
                self.audio_frames += 1;
                self.audio_bytes += data.len();
            }
            Frame::Error { .. } => self.errors += 1,
            _ => {}
        }
    }

    pub fn from_frames<'a>(frames: impl IntoIterator<Item = &'a Frame>) -> Self {
        let mut tally = Self::default();
        for frame in frames {
            tally.record(frame);
        }
        tally
    }

    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "{} frames, {} text, {} audio ({} bytes)",
            self.frames, self.text_frames, self.audio_frames, self.audio_bytes
        );
        if self.errors > 0 {
            line.push_str(&format!(", {} errors", self.errors));
        }
        line
    }
}

/// Uncolored one-line rendering, `None` for frames not worth showing.
pub fn frame_line(frame: &Frame) -> Option<String> {
    let line = match frame {
        Frame::Text { text, out_of_band } => {
            if *out_of_band {
                format!("text*  {}", text)
            } else {
                format!("text   {}", text)
            }
        }
        Frame::Audio {
            data,
            sample_rate,
            channels,
        } => format!(
            "audio  {} bytes @ {}Hz {}",
            data.len(),
            sample_rate,
            channel_label(*channels)
        ),
        Frame::Image { url, data } => format!("image  {} ({} bytes)", url, data.len()),
        Frame::Transcription {
            text,
            participant_id,
            ..
        } => format!("heard  [{}] {}", participant_id, text),
        Frame::LlmMessages(messages) => {
            let last = messages
                .last()
                .map(|m| format!("{}: {}", m.role, m.content))
                .unwrap_or_default();
            format!("ctx    {} messages, last {}", messages.len(), last)
        }
        Frame::Control(ControlSignal::Custom(name)) => format!("ctrl   {}", name),
        Frame::Control(signal) => format!("ctrl   {:?}", signal),
        Frame::ServiceCompleted { service, text, .. } => match text {
            Some(text) => format!("done   {} {:?}", service, text),
            None => format!("done   {}", service),
        },
        Frame::Error { message } => format!("error  {}", message),
        Frame::EndOfStream => return None,
    };
    Some(line)
}

/// Colored rendering of [`frame_line`].
pub fn render_frame(frame: &Frame) -> Option<String> {
    let line = frame_line(frame)?;
    let colored = match frame {
        Frame::Text { .. } => line.green().to_string(),
        Frame::Transcription { .. } => line.cyan().to_string(),
        Frame::Error { .. } => line.red().to_string(),
        Frame::Audio { .. } | Frame::LlmMessages(_) | Frame::Control(_) => {
            line.dimmed().to_string()
        }
        Frame::ServiceCompleted { .. } => line.yellow().to_string(),
        _ => line,
    };
    Some(colored)
}

/// Spawns a task that renders frames arriving on a bounded queue of
/// `capacity` frames, skipping those `show` rejects.
///
/// The task ends when every sender is dropped and returns the tally of the
/// frames it showed. Quiet mode renders nothing but still counts.
pub fn spawn_renderer(
    capacity: usize,
    quiet: bool,
    show: fn(&Frame) -> bool,
) -> (FrameSender, JoinHandle<FrameTally>) {
    let (tx, mut rx) = frame_queue(capacity);
    let task = tokio::spawn(async move {
        let mut tally = FrameTally::default();
        while let Some(frame) = rx.recv().await {
            if !show(&frame) {
                continue;
            }
            tally.record(&frame);
            if !quiet && let Some(line) = render_frame(&frame) {
                println!("{}", line);
            }
        }
        tally
    });
    (tx, task)
}

/// Print the tally line to stderr, red when errors were seen.
pub fn print_tally(tally: &FrameTally) {
    if tally.errors > 0 {
        eprintln!("{}", tally.summary_line().red());
    } else {
        eprintln!("{}", tally.summary_line().dimmed());
    }
}

fn channel_label(channels: u16) -> String {
    match channels {
        1 => "mono".to_string(),
        2 => "stereo".to_string(),
        n => format!("{}ch", n),
    }
}
