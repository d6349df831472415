use image::{DynamicImage, ImageFormat};
use std::ffi::OsStr;
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("Camera access was denied. Please allow camera access to use gesture controls.")]
    PermissionDenied,
    #[error("No camera was found on your device.")]
    NotFound,
    #[error("Camera is already in use by another application.")]
    Busy,
    #[error("Camera error: {0}")]
    Other(String),
}

impl CameraError {
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::ResourceBusy => Self::Busy,
            _ => Self::Other(err.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn from_image(image: &DynamicImage) -> Result<Self, CameraError> {
        // JPEG has no alpha channel.
        let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
        let mut jpeg = Vec::new();
        rgb.write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
            .map_err(|err| CameraError::Other(format!("jpeg encode failed: {err}")))?;
        Ok(Self {
            jpeg,
            width: rgb.width(),
            height: rgb.height(),
        })
    }
}

pub trait Camera: Send {
    fn open(&mut self) -> Result<(), CameraError>;
    fn capture(&mut self) -> Result<Frame, CameraError>;
    /// Stops every underlying stream. Safe to call when already released.
    fn release(&mut self);
    fn is_open(&self) -> bool;
}

/// Exclusive use of an open camera. The camera is released when the session
/// goes out of scope, whichever way that happens.
pub struct CameraSession<'a> {
    camera: &'a mut dyn Camera,
}

impl<'a> CameraSession<'a> {
    pub fn acquire(camera: &'a mut dyn Camera) -> Result<Self, CameraError> {
        if let Err(err) = camera.open() {
            // Busy means someone else holds it.
            if err != CameraError::Busy {
                camera.release();
            }
            return Err(err);
        }
        debug!("camera acquired");
        Ok(Self { camera })
    }

    pub fn capture(&mut self) -> Result<Frame, CameraError> {
        self.camera.capture()
    }
}

impl Drop for CameraSession<'_> {
    fn drop(&mut self) {
        self.camera.release();
        debug!("camera released");
    }
}

// Directory of stills served in file name order, looping.
pub struct StillFrameCamera {
    dir: PathBuf,
    frames: Vec<PathBuf>,
    cursor: usize,
    open: bool,
}

impl StillFrameCamera {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            frames: Vec::new(),
            cursor: 0,
            open: false,
        }
    }

    fn scan(&self) -> Result<Vec<PathBuf>, CameraError> {
        let metadata = fs::metadata(&self.dir).map_err(|err| CameraError::from_io(&err))?;
        if !metadata.is_dir() {
            return Err(CameraError::NotFound);
        }

        let mut frames = Vec::new();
        for entry in WalkDir::new(&self.dir)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    return Err(err
                        .io_error()
                        .map(CameraError::from_io)
                        .unwrap_or_else(|| CameraError::Other(err.to_string())));
                }
            };
            if entry.file_type().is_file() && is_frame_file(entry.path()) {
                frames.push(entry.into_path());
            }
        }
        Ok(frames)
    }
}

impl Camera for StillFrameCamera {
    fn open(&mut self) -> Result<(), CameraError> {
        if self.open {
            return Err(CameraError::Busy);
        }

        let frames = self.scan()?;
        if frames.is_empty() {
            warn!(dir = %self.dir.display(), "no frames found");
            return Err(CameraError::NotFound);
        }
        debug!(dir = %self.dir.display(), frames = frames.len(), "still frame camera opened");
        self.frames = frames;
        self.cursor = 0;
        self.open = true;
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        if !self.open || self.frames.is_empty() {
            return Err(CameraError::Other(String::from("camera is not open")));
        }

        let path = &self.frames[self.cursor % self.frames.len()];
        self.cursor = (self.cursor + 1) % self.frames.len();
        let bytes = fs::read(path).map_err(|err| CameraError::from_io(&err))?;
        let image = image::load_from_memory(&bytes)
            .map_err(|err| CameraError::Other(format!("{}: {err}", path.display())))?;
        Frame::from_image(&image)
    }

    fn release(&mut self) {
        self.open = false;
        self.frames.clear();
        self.cursor = 0;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

fn is_frame_file(path: &Path) -> bool {
    let ext = path.extension().and_then(OsStr::to_str).unwrap_or_default();
    FRAME_EXTENSIONS
        .iter()
        .any(|supported| ext.eq_ignore_ascii_case(supported))
}
