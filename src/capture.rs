//! Camera capture: device enumeration, a worker thread that feeds the
//! latest-frame slot, and the Stopped/Running session around it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use image::RgbImage;
use itertools::Itertools;
use log::{debug, error, info, warn};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

use crate::error::CaptureError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub index: u32,
    pub name: String,
}

/// Blocking frame producer. Lives entirely on the capture worker thread.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<RgbImage, CaptureError>;
}

pub trait CameraBackend: Send + Sync {
    fn devices(&self) -> Result<Vec<Device>, CaptureError>;

    /// Called on the worker thread; the returned source never crosses threads.
    fn open(&self, device: &Device) -> Result<Box<dyn FrameSource>, CaptureError>;
}

/// Native camera access through nokhwa.
pub struct NokhwaBackend;

impl CameraBackend for NokhwaBackend {
    fn devices(&self) -> Result<Vec<Device>, CaptureError> {
        let cameras =
            nokhwa::query(ApiBackend::Auto).map_err(|e| CaptureError::Query(e.to_string()))?;
        Ok(cameras
            .iter()
            .enumerate()
            .map(|(pos, info)| Device {
                index: info.index().as_index().unwrap_or(pos as u32),
                name: info.human_name(),
            })
            .collect())
    }

    fn open(&self, device: &Device) -> Result<Box<dyn FrameSource>, CaptureError> {
        let open_err = |e: nokhwa::NokhwaError| CaptureError::Open {
            name: device.name.clone(),
            reason: e.to_string(),
        };
        let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(CameraIndex::Index(device.index), format).map_err(open_err)?;
        camera.open_stream().map_err(open_err)?;
        debug!("opened '{}' with {:?}", device.name, camera.camera_format());
        Ok(Box::new(NokhwaSource { camera }))
    }
}

struct NokhwaSource {
    camera: Camera,
}

impl FrameSource for NokhwaSource {
    fn next_frame(&mut self) -> Result<RgbImage, CaptureError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CaptureError::Frame(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CaptureError::Frame(e.to_string()))?;
        let (width, height) = (decoded.width(), decoded.height());
        RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| CaptureError::Frame(format!("short buffer for {width}x{height}")))
    }
}

impl Drop for NokhwaSource {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            warn!("stop stream: {e}");
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub seq: u64,
    pub image: Arc<RgbImage>,
}

#[derive(Default)]
struct SlotState {
    frame: Option<Arc<RgbImage>>,
    seq: u64,
}

/// Latest-frame mailbox. Writers overwrite, readers see only the newest frame.
#[derive(Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<SlotState>>,
}

impl FrameSlot {
    pub fn put(&self, image: RgbImage) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.seq += 1;
        state.frame = Some(Arc::new(image));
    }

    pub fn latest(&self) -> Option<Frame> {
        let state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.frame.as_ref().map(|image| Frame {
            seq: state.seq,
            image: Arc::clone(image),
        })
    }

    pub fn clear(&self) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.frame = None;
    }
}

/// Called after each delivered frame, and once when the worker exits.
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// A running capture worker.
pub struct Capture {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Capture {
    /// Spawns the worker and waits until it has opened the camera (or failed to).
    pub fn start(
        backend: Arc<dyn CameraBackend>,
        device: Device,
        slot: FrameSlot,
        waker: Waker,
    ) -> Result<Self, CaptureError> {
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();

        let worker = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("capture".to_string())
                .spawn(move || run_worker(backend, device, slot, stop, waker, ready_tx))?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Capture {
                stop,
                worker: Some(worker),
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(CaptureError::WorkerLost)
            }
        }
    }

    /// True once the worker has ended on its own.
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Signals the worker and blocks until the device has halted.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("capture worker panicked");
            }
        }
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.halt();
    }
}

fn run_worker(
    backend: Arc<dyn CameraBackend>,
    device: Device,
    slot: FrameSlot,
    stop: Arc<AtomicBool>,
    waker: Waker,
    ready: mpsc::Sender<Result<(), CaptureError>>,
) {
    let mut source = match backend.open(&device) {
        Ok(source) => {
            let _ = ready.send(Ok(()));
            source
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while !stop.load(Ordering::Acquire) {
        match source.next_frame() {
            Ok(frame) => {
                slot.put(frame);
                waker();
            }
            Err(e) => {
                error!("capture from '{}' ended: {e}", device.name);
                break;
            }
        }
    }

    drop(source);
    debug!("capture worker for '{}' halted", device.name);
    waker();
}

enum CaptureState {
    Stopped,
    Running(Capture),
}

/// Stopped/Running lifecycle for the selected camera.
pub struct Session {
    backend: Arc<dyn CameraBackend>,
    devices: Vec<Device>,
    selected: usize,
    state: CaptureState,
    slot: FrameSlot,
}

impl Session {
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Session {
            backend,
            devices: Vec::new(),
            selected: 0,
            state: CaptureState::Stopped,
            slot: FrameSlot::default(),
        }
    }

    /// Re-enumerates cameras, preselecting `preferred` when present.
    pub fn refresh_devices(&mut self, preferred: Option<&str>) -> Result<&[Device], CaptureError> {
        let devices = self.backend.devices()?;
        if devices.is_empty() {
            self.devices.clear();
            return Err(CaptureError::NoDevice);
        }
        info!(
            "found {} camera(s): {}",
            devices.len(),
            devices.iter().map(|d| &d.name).join(", ")
        );

        self.selected = preferred
            .and_then(|name| devices.iter().position(|d| d.name == name))
            .unwrap_or(0);
        self.devices = devices;
        Ok(&self.devices)
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Ignored while running or when out of range.
    pub fn select(&mut self, index: usize) {
        if self.selection_enabled() && index < self.devices.len() {
            self.selected = index;
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, CaptureState::Running(_))
    }

    pub fn selection_enabled(&self) -> bool {
        !self.is_running()
    }

    pub fn can_start(&self) -> bool {
        self.is_running() || !self.devices.is_empty()
    }

    pub fn toggle_label(&self) -> &'static str {
        if self.is_running() {
            "Dừng"
        } else {
            "Bắt đầu"
        }
    }

    /// True when running but the worker has already exited.
    pub fn worker_exited(&self) -> bool {
        match &self.state {
            CaptureState::Running(capture) => capture.is_finished(),
            CaptureState::Stopped => false,
        }
    }

    pub fn start(&mut self, waker: Waker) -> Result<(), CaptureError> {
        if self.is_running() {
            return Ok(());
        }
        let device = self
            .devices
            .get(self.selected)
            .cloned()
            .ok_or(CaptureError::NoDevice)?;

        info!("starting capture on '{}'", device.name);
        let capture = Capture::start(Arc::clone(&self.backend), device, self.slot.clone(), waker)?;
        self.state = CaptureState::Running(capture);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let CaptureState::Running(capture) =
            std::mem::replace(&mut self.state, CaptureState::Stopped)
        {
            capture.stop();
            info!("capture stopped");
        }
        self.slot.clear();
    }

    pub fn current_frame(&self) -> Option<Frame> {
        self.slot.latest()
    }
}
