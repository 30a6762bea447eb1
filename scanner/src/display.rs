//! Sinks for operator views: headless, JPEG snapshots, or native windows
//! with the `window` feature.

use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::{debug, info, trace};

use crate::input::Key;

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("failed to write snapshot {path}: {source}")]
    Snapshot {
        path: String,
        source: image::ImageError,
    },
    #[error("failed to create snapshot dir {0}: {1}")]
    SnapshotDir(String, std::io::Error),
    #[cfg(feature = "window")]
    #[error("window error: {0}")]
    Window(#[from] minifb::Error),
}

/// Where operator views go. Each view is identified by its title.
pub trait Display {
    fn show(&mut self, view: &str, image: &RgbImage) -> Result<(), DisplayError>;

    /// A key pressed in the display since the last poll.
    fn poll_key(&mut self) -> Option<Key> {
        None
    }

    /// Release display resources. Safe to call more than once.
    fn close(&mut self);
}

impl<D: Display + ?Sized> Display for Box<D> {
    fn show(&mut self, view: &str, image: &RgbImage) -> Result<(), DisplayError> {
        (**self).show(view, image)
    }

    fn poll_key(&mut self) -> Option<Key> {
        (**self).poll_key()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Discards every view.
#[derive(Debug, Default)]
pub struct Headless {
    shown: u64,
}

impl Headless {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_shown(&self) -> u64 {
        self.shown
    }
}

impl Display for Headless {
    fn show(&mut self, view: &str, image: &RgbImage) -> Result<(), DisplayError> {
        self.shown += 1;
        trace!(view, width = image.width(), height = image.height(), "headless view");
        Ok(())
    }

    fn close(&mut self) {}
}

/// Keeps the latest image of every view as `<dir>/<view>.jpg`.
pub struct SnapshotDisplay {
    dir: PathBuf,
    closed: bool,
}

impl SnapshotDisplay {
    pub fn new(dir: &Path) -> Result<Self, DisplayError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| DisplayError::SnapshotDir(dir.display().to_string(), e))?;
        info!(dir = %dir.display(), "writing operator views as snapshots");
        Ok(Self {
            dir: dir.to_path_buf(),
            closed: false,
        })
    }

    pub fn path_for(&self, view: &str) -> PathBuf {
        let name: String = view
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.jpg"))
    }
}

impl Display for SnapshotDisplay {
    fn show(&mut self, view: &str, image: &RgbImage) -> Result<(), DisplayError> {
        if self.closed {
            return Ok(());
        }
        let path = self.path_for(view);
        image.save(&path).map_err(|source| DisplayError::Snapshot {
            path: path.display().to_string(),
            source,
        })
    }

    fn close(&mut self) {
        if !self.closed {
            debug!(dir = %self.dir.display(), "snapshot display closed");
            self.closed = true;
        }
    }
}

#[cfg(feature = "window")]
pub use window::WindowDisplay;

#[cfg(feature = "window")]
mod window {
    use std::collections::HashMap;

    use image::RgbImage;
    use minifb::{KeyRepeat, Window, WindowOptions};
    use tracing::info;

    use super::{Display, DisplayError};
    use crate::input::Key;

    /// Packs RGB pixels into the 0RGB words minifb expects.
    fn rgb_to_argb(image: &RgbImage) -> Vec<u32> {
        image
            .pixels()
            .map(|p| ((p.0[0] as u32) << 16) | ((p.0[1] as u32) << 8) | p.0[2] as u32)
            .collect()
    }

    /// One native window per view.
    #[derive(Default)]
    pub struct WindowDisplay {
        windows: HashMap<String, Window>,
    }

    impl WindowDisplay {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Display for WindowDisplay {
        fn show(&mut self, view: &str, image: &RgbImage) -> Result<(), DisplayError> {
            let (w, h) = (image.width() as usize, image.height() as usize);
            if !self.windows.contains_key(view) {
                let window = Window::new(view, w, h, WindowOptions::default())?;
                info!(view, width = w, height = h, "opened window");
                self.windows.insert(view.to_string(), window);
            }
            if let Some(window) = self.windows.get_mut(view) {
                window.update_with_buffer(&rgb_to_argb(image), w, h)?;
            }
            Ok(())
        }

        fn poll_key(&mut self) -> Option<Key> {
            for window in self.windows.values() {
                if !window.is_open() {
                    return Some(Key::Escape);
                }
                for key in window.get_keys_pressed(KeyRepeat::No) {
                    match key {
                        minifb::Key::Escape => return Some(Key::Escape),
                        minifb::Key::Q => return Some(Key::Char('q')),
                        _ => {}
                    }
                }
            }
            None
        }

        fn close(&mut self) {
            self.windows.clear();
        }
    }

}
