// ONNX Runtime session construction with hardware acceleration selection,
// plus the bounded pool sessions are borrowed from during inference.

use anyhow::{Context, Result};
use crossbeam::channel::{bounded, Receiver, Sender};
use ort::execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::ops::{Deref, DerefMut};
use tracing::{debug, info, warn};

#[cfg(feature = "tensorrt")]
use ort::execution_providers::TensorRTExecutionProvider;

#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;

#[cfg(all(target_os = "macos", feature = "coreml"))]
use ort::execution_providers::CoreMLExecutionProvider;

#[cfg(all(target_os = "windows", feature = "directml"))]
use ort::execution_providers::DirectMLExecutionProvider;

#[cfg(feature = "openvino")]
use ort::execution_providers::OpenVINOExecutionProvider;

/// Calculate thread count for ONNX Runtime CPU inference.
///
/// Windows loses throughput to thread synchronisation past ~6 threads;
/// elsewhere every core is used.
fn optimal_intra_op_threads() -> usize {
    let total_cores = num_cpus::get();

    #[cfg(target_os = "windows")]
    let optimal = std::cmp::min(6, total_cores).max(1);

    #[cfg(not(target_os = "windows"))]
    let optimal = total_cores.max(1);

    debug!("CPU threads: {} total cores, using {} for inference", total_cores, optimal);
    optimal
}

/// Bounded pool of ONNX Runtime sessions for one model
pub struct OnnxSessionPool {
    sender: Sender<Session>,
    receiver: Receiver<Session>,
}

impl OnnxSessionPool {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    /// Put a freshly built session into the pool
    pub fn add(&self, session: Session) {
        // The pool owns both channel ends, so the channel never disconnects
        self.sender
            .send(session)
            .expect("session pool channel disconnected");
    }

    /// Borrow a session, blocking until one is idle. It returns to the pool on drop.
    pub fn acquire(&self) -> PooledSession<'_> {
        let session = self
            .receiver
            .recv()
            .expect("session pool channel disconnected");
        PooledSession {
            pool: self,
            session: Some(session),
        }
    }
}

/// Session on loan from an [`OnnxSessionPool`]
pub struct PooledSession<'a> {
    pool: &'a OnnxSessionPool,
    session: Option<Session>,
}

impl Deref for PooledSession<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        self.session.as_ref().expect("session already returned")
    }
}

impl DerefMut for PooledSession<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        self.session.as_mut().expect("session already returned")
    }
}

impl Drop for PooledSession<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.add(session);
        }
    }
}

fn commit_session(provider: ExecutionProviderDispatch, model_bytes: &[u8]) -> ort::Result<Session> {
    Session::builder()?
        .with_execution_providers([provider])?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(optimal_intra_op_threads())?
        .with_inter_threads(1)?
        .commit_from_memory(model_bytes)
}

/// Build an ONNX Runtime session, trying compiled-in accelerators first.
///
/// Order: TensorRT, CUDA, CoreML, DirectML, OpenVINO, then plain CPU.
/// `forced_backend` (case-insensitive, `AUTO` meaning no preference) skips the
/// search.
///
/// # Returns
/// (backend_name, Session)
pub fn build_session_with_acceleration(
    model_bytes: &[u8],
    model_name: &str,
    forced_backend: Option<&str>,
) -> Result<(String, Session)> {
    if let Some(backend) = forced_backend {
        if !backend.is_empty() && !backend.eq_ignore_ascii_case("auto") {
            info!("INFERENCE_BACKEND={}, forcing specific backend for {}", backend, model_name);
            return try_forced_backend(backend, model_bytes, model_name);
        }
    }

    #[cfg(feature = "tensorrt")]
    {
        if let Ok(session) = commit_session(TensorRTExecutionProvider::default().build(), model_bytes) {
            info!("✓ Using TensorRT acceleration for {}", model_name);
            return Ok(("TensorRT".to_string(), session));
        }
    }

    #[cfg(feature = "cuda")]
    {
        if let Ok(session) = commit_session(CUDAExecutionProvider::default().build(), model_bytes) {
            info!("✓ Using CUDA acceleration for {}", model_name);
            return Ok(("CUDA".to_string(), session));
        }
    }

    #[cfg(all(target_os = "macos", feature = "coreml"))]
    {
        if let Ok(session) = commit_session(CoreMLExecutionProvider::default().build(), model_bytes) {
            info!("✓ Using CoreML acceleration for {}", model_name);
            return Ok(("CoreML".to_string(), session));
        }
    }

    #[cfg(all(target_os = "windows", feature = "directml"))]
    {
        // DirectML needs sequential execution and no memory pattern
        if let Ok(session) = Session::builder()
            .and_then(|b| b.with_execution_providers([DirectMLExecutionProvider::default().build()]))
            .and_then(|b| b.with_parallel_execution(false))
            .and_then(|b| b.with_memory_pattern(false))
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level1))
            .and_then(|b| b.commit_from_memory(model_bytes))
        {
            info!("✓ Using DirectML acceleration for {}", model_name);
            return Ok(("DirectML".to_string(), session));
        }
    }

    #[cfg(feature = "openvino")]
    {
        let provider = OpenVINOExecutionProvider::default()
            .with_device_type("CPU")
            .build();
        if let Ok(session) = commit_session(provider, model_bytes) {
            info!("✓ Using OpenVINO acceleration for {}", model_name);
            return Ok(("OpenVINO-CPU".to_string(), session));
        }
    }

    let session = commit_session(CPUExecutionProvider::default().build(), model_bytes)
        .with_context(|| {
            format!(
                "Failed to load {} ONNX model ({:.1} MB). Check that the file is a valid \
                 ONNX export and matches the ONNX Runtime opset",
                model_name,
                model_bytes.len() as f64 / 1_048_576.0
            )
        })?;

    if cfg!(any(
        feature = "cuda",
        feature = "tensorrt",
        feature = "openvino",
        feature = "directml",
        feature = "coreml"
    )) {
        warn!("⚠️  Accelerators unavailable, using CPU inference for {}", model_name);
    } else {
        info!("✓ Using CPU inference for {}", model_name);
    }
    Ok(("CPU".to_string(), session))
}

fn try_forced_backend(
    backend: &str,
    model_bytes: &[u8],
    model_name: &str,
) -> Result<(String, Session)> {
    let (name, provider): (&str, ExecutionProviderDispatch) = match backend.to_uppercase().as_str() {
        "CPU" => ("CPU", CPUExecutionProvider::default().build()),

        #[cfg(feature = "cuda")]
        "CUDA" => ("CUDA", CUDAExecutionProvider::default().build()),

        #[cfg(feature = "tensorrt")]
        "TENSORRT" => ("TensorRT", TensorRTExecutionProvider::default().build()),

        #[cfg(feature = "openvino")]
        "OPENVINO" => (
            "OpenVINO-CPU",
            OpenVINOExecutionProvider::default().with_device_type("CPU").build(),
        ),

        #[cfg(all(target_os = "windows", feature = "directml"))]
        "DIRECTML" => ("DirectML", DirectMLExecutionProvider::default().build()),

        #[cfg(all(target_os = "macos", feature = "coreml"))]
        "COREML" => ("CoreML", CoreMLExecutionProvider::default().build()),

        other => anyhow::bail!(
            "Inference backend '{}' is not available in this build. \
             Valid options: CPU, AUTO, or an accelerator enabled via Cargo features \
             (cuda, tensorrt, openvino, directml, coreml)",
            other
        ),
    };

    let session = commit_session(provider, model_bytes)
        .with_context(|| format!("Failed to load {} with {} backend", model_name, name))?;
    info!("✓ Forced {} backend for {}", name, model_name);
    Ok((format!("{} (forced)", name), session))
}
