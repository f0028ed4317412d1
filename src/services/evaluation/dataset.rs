// data.yaml parsing and YOLO label loading for validation runs

use rayon::prelude::*;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::core::errors::{EvaluationError, EvaluationResult};

const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "bmp", "webp", "tif", "tiff", "dng"];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassNames {
    List(Vec<String>),
    Map(BTreeMap<usize, String>),
}

#[derive(Debug, Deserialize)]
struct RawDatasetConfig {
    path: Option<PathBuf>,
    val: Option<String>,
    nc: Option<usize>,
    names: Option<ClassNames>,
}

/// Resolved contents of a `data.yaml`
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub root: PathBuf,
    pub val: Option<PathBuf>,
    pub names: BTreeMap<usize, String>,
}

impl DatasetConfig {
    pub fn load(path: &Path) -> EvaluationResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| EvaluationError::ConfigReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&text, base).map_err(|source| EvaluationError::ConfigParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse yaml text; relative paths resolve against `base`
    pub fn parse(text: &str, base: &Path) -> Result<Self, serde_yaml::Error> {
        let raw: RawDatasetConfig = serde_yaml::from_str(text)?;

        let root = match raw.path {
            Some(p) if p.is_absolute() => p,
            Some(p) => base.join(p),
            None => base.to_path_buf(),
        };

        let mut names: BTreeMap<usize, String> = match raw.names {
            Some(ClassNames::List(list)) => list.into_iter().enumerate().collect(),
            Some(ClassNames::Map(map)) => map,
            None => BTreeMap::new(),
        };
        if let Some(nc) = raw.nc {
            for id in 0..nc {
                names.entry(id).or_insert_with(|| format!("class{}", id));
            }
        }

        Ok(Self {
            val: raw.val.map(|s| resolve_split(&root, &s)),
            root,
            names,
        })
    }
}

/// Resolve a split path; Roboflow exports write `../train/images` relative to
/// the dataset root, so a missing `../` path is retried without the prefix.
fn resolve_split(root: &Path, split: &str) -> PathBuf {
    let candidate = Path::new(split);
    if candidate.is_absolute() {
        return candidate.to_path_buf();
    }

    let joined = root.join(candidate);
    if !joined.exists() {
        if let Some(stripped) = split.strip_prefix("../") {
            let fallback = root.join(stripped);
            if fallback.exists() {
                return fallback;
            }
        }
    }
    joined
}

/// One ground-truth object in pixel coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruth {
    pub class_id: u32,
    pub bbox: [f32; 4],
}

/// An image and its labelled objects
#[derive(Debug, Clone)]
pub struct Sample {
    pub image_path: PathBuf,
    pub ground_truth: Vec<GroundTruth>,
}

/// Label file for an image: `.../images/x.jpg` -> `.../labels/x.txt`
pub fn label_path_for(image_path: &Path) -> PathBuf {
    let stem = image_path.file_stem().unwrap_or_default();
    let file_name = {
        let mut name = stem.to_os_string();
        name.push(".txt");
        name
    };

    match image_path.parent() {
        Some(dir) if dir.file_name().is_some_and(|n| n == "images") => dir
            .parent()
            .map(|p| p.join("labels"))
            .unwrap_or_else(|| PathBuf::from("labels"))
            .join(file_name),
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// Parse YOLO label text (`class cx cy w h`, normalised) into pixel boxes.
///
/// Polygon rows (`class x1 y1 x2 y2 ...`) are reduced to their bounding box.
pub fn parse_labels(
    text: &str,
    width: u32,
    height: u32,
    path: &Path,
) -> EvaluationResult<Vec<GroundTruth>> {
    let (w, h) = (width as f32, height as f32);
    let mut objects = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let malformed = |reason: String| EvaluationError::MalformedLabel {
            path: path.to_path_buf(),
            line: index + 1,
            reason,
        };

        let mut tokens = line.split_whitespace();
        let class_token = tokens.next().unwrap_or_default();
        let class_id: u32 = class_token
            .parse::<f32>()
            .ok()
            .filter(|c| *c >= 0.0 && c.fract() == 0.0)
            .map(|c| c as u32)
            .ok_or_else(|| malformed(format!("invalid class '{}'", class_token)))?;

        let values: Vec<f32> = tokens
            .map(|t| t.parse::<f32>().map_err(|_| malformed(format!("invalid number '{}'", t))))
            .collect::<Result<_, _>>()?;

        let bbox = match values.len() {
            4 => {
                let (cx, cy, bw, bh) = (values[0], values[1], values[2], values[3]);
                [
                    (cx - bw / 2.0) * w,
                    (cy - bh / 2.0) * h,
                    (cx + bw / 2.0) * w,
                    (cy + bh / 2.0) * h,
                ]
            }
            n if n >= 6 && n % 2 == 0 => {
                let xs = values.iter().step_by(2);
                let ys = values.iter().skip(1).step_by(2);
                let (min_x, max_x) = xs.fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
                let (min_y, max_y) = ys.fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
                [min_x * w, min_y * h, max_x * w, max_y * h]
            }
            n => return Err(malformed(format!("expected 4 box values or a polygon, got {}", n))),
        };

        objects.push(GroundTruth { class_id, bbox });
    }

    Ok(objects)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// List images in `dir`, sorted by path
pub fn list_images(dir: &Path) -> EvaluationResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| EvaluationError::ReadFailed {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut images = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| EvaluationError::ReadFailed {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && is_image(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Load every image of a split together with its labels.
///
/// An image without a label file is a background image with no objects.
pub fn load_samples(images_dir: &Path) -> EvaluationResult<Vec<Sample>> {
    let images = list_images(images_dir)?;
    if images.is_empty() {
        return Err(EvaluationError::NoImages(images_dir.to_path_buf()));
    }

    let samples = images
        .par_iter()
        .map(|image_path| {
            let (width, height) = image::image_dimensions(image_path).map_err(|source| {
                EvaluationError::ImageSizeFailed {
                    path: image_path.clone(),
                    source,
                }
            })?;

            let label_path = label_path_for(image_path);
            let ground_truth = if label_path.is_file() {
                let text = fs::read_to_string(&label_path).map_err(|source| {
                    EvaluationError::ReadFailed {
                        path: label_path.clone(),
                        source,
                    }
                })?;
                parse_labels(&text, width, height, &label_path)?
            } else {
                Vec::new()
            };

            Ok(Sample {
                image_path: image_path.clone(),
                ground_truth,
            })
        })
        .collect::<EvaluationResult<Vec<_>>>()?;

    let backgrounds = samples.iter().filter(|s| s.ground_truth.is_empty()).count();
    if backgrounds == samples.len() {
        warn!("No labels found for any image in {}", images_dir.display());
    }
    debug!(
        "Loaded {} images ({} backgrounds) from {}",
        samples.len(),
        backgrounds,
        images_dir.display()
    );

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    #[test]
    fn test_parse_roboflow_yaml() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("valid/images")).unwrap();

        let yaml = "train: ../train/images\nval: ../valid/images\nnc: 2\nnames: ['stain', 'tear']\n";
        let config = DatasetConfig::parse(yaml, dir.path()).unwrap();

        assert_eq!(config.val.unwrap(), dir.path().join("valid/images"));
        assert_eq!(config.names[&1], "tear");
        assert_eq!(config.names.len(), 2);
    }

    #[test]
    fn test_parse_yaml_with_path_and_name_map() {
        let yaml = "path: /data/cloth\nval: valid/images\nnames:\n  0: stain\n  3: hole\n";
        let config = DatasetConfig::parse(yaml, Path::new("/ignored")).unwrap();

        assert_eq!(config.root, PathBuf::from("/data/cloth"));
        assert_eq!(config.val.unwrap(), PathBuf::from("/data/cloth/valid/images"));
        assert_eq!(config.names[&3], "hole");
    }

    #[test]
    fn test_nc_fills_missing_names() {
        let config = DatasetConfig::parse("val: v\nnc: 2\n", Path::new(".")).unwrap();
        assert_eq!(config.names[&1], "class1");
    }

    #[test]
    fn test_label_path_for_images_dir() {
        assert_eq!(
            label_path_for(Path::new("data/valid/images/a.jpg")),
            PathBuf::from("data/valid/labels/a.txt")
        );
        assert_eq!(
            label_path_for(Path::new("flat/b.png")),
            PathBuf::from("flat/b.txt")
        );
    }

    #[test]
    fn test_parse_box_and_polygon_labels() {
        let text = "0 0.5 0.5 0.2 0.4\n\n1 0.1 0.1 0.3 0.1 0.3 0.5 0.1 0.5\n";
        let labels = parse_labels(text, 100, 200, Path::new("x.txt")).unwrap();

        assert_eq!(labels.len(), 2);
        let b = labels[0].bbox;
        assert!((b[0] - 40.0).abs() < 1e-4 && (b[1] - 60.0).abs() < 1e-4);
        assert!((b[2] - 60.0).abs() < 1e-4 && (b[3] - 140.0).abs() < 1e-4);
        assert_eq!(labels[1].class_id, 1);
        let p = labels[1].bbox;
        assert!((p[0] - 10.0).abs() < 1e-4 && (p[3] - 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_malformed_label_reports_line() {
        let err = parse_labels("0 0.5 0.5 0.1 0.1\nx 1 2 3 4\n", 10, 10, Path::new("bad.txt"))
            .unwrap_err();
        assert!(matches!(err, EvaluationError::MalformedLabel { line: 2, .. }));

        assert!(parse_labels("0 0.5 0.5\n", 10, 10, Path::new("short.txt")).is_err());
    }

    #[test]
    fn test_load_samples_pairs_images_with_labels() {
        let dir = tempdir().unwrap();
        let images = dir.path().join("valid/images");
        let labels = dir.path().join("valid/labels");
        fs::create_dir_all(&images).unwrap();
        fs::create_dir_all(&labels).unwrap();

        RgbImage::from_pixel(40, 20, Rgb([1, 2, 3]))
            .save(images.join("a.png"))
            .unwrap();
        RgbImage::from_pixel(10, 10, Rgb([1, 2, 3]))
            .save(images.join("b.png"))
            .unwrap();
        fs::write(labels.join("a.txt"), "0 0.5 0.5 0.5 0.5\n").unwrap();
        fs::write(images.join("notes.md"), "ignored").unwrap();

        let samples = load_samples(&images).unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].ground_truth.len(), 1);
        // 0.5 * 0.5 box on a 40x20 image
        assert_eq!(samples[0].ground_truth[0].bbox, [10.0, 5.0, 30.0, 15.0]);
        assert!(samples[1].ground_truth.is_empty());
    }

    #[test]
    fn test_empty_split_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            load_samples(dir.path()),
            Err(EvaluationError::NoImages(_))
        ));
    }
}
