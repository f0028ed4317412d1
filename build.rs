use std::env;

fn main() {
    // The model is read at runtime; only note when the default location is empty
    let default_model = "models/best.onnx";
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=MODEL_PATH");

    if env::var("MODEL_PATH").is_err() && !std::path::Path::new(default_model).exists() {
        println!(
            "cargo:warning=No model at {}; set MODEL_PATH or export one with the train tool",
            default_model
        );
    }

    // Detect enabled acceleration features
    let mut enabled_features = Vec::new();

    if env::var("CARGO_FEATURE_CUDA").is_ok() {
        enabled_features.push("CUDA");
    }
    if env::var("CARGO_FEATURE_TENSORRT").is_ok() {
        enabled_features.push("TensorRT");
    }
    if env::var("CARGO_FEATURE_DIRECTML").is_ok() {
        enabled_features.push("DirectML");
    }
    if env::var("CARGO_FEATURE_COREML").is_ok() {
        enabled_features.push("CoreML");
    }
    if env::var("CARGO_FEATURE_OPENVINO").is_ok() {
        enabled_features.push("OpenVINO");
    }

    if enabled_features.is_empty() {
        println!("cargo:warning=Building with CPU-only inference (no GPU acceleration)");
    } else {
        println!("cargo:warning=GPU acceleration enabled: {}", enabled_features.join(", "));
    }

    let target = env::var("TARGET").unwrap_or_default();
    if target.contains("windows-gnu") && enabled_features.contains(&"CUDA") {
        println!("cargo:warning=CUDA binaries may not be available for Windows GNU target");
    }
}
