use anchorwire_pose::{PipelineConfig, PipelineError, PipelineOutput};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors of the command line front end.
#[derive(Debug, Error)]
pub enum CliError {
    /// A file could not be read or written.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file is not the expected JSON.
    #[error("{}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Output could not be serialized.
    #[error("serializing output: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The pipeline failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

#[derive(Debug, Deserialize)]
struct PercentPoint {
    #[serde(rename = "xPct")]
    x_pct: f64,
    #[serde(rename = "yPct")]
    y_pct: f64,
}

#[derive(Debug, Deserialize)]
struct Point3 {
    x: f64,
    y: f64,
    z: f64,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let data = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Read `[{"xPct": .., "yPct": ..}, ...]`.
pub fn read_points2d(path: &Path) -> Result<Vec<[f64; 2]>, CliError> {
    let points: Vec<PercentPoint> = read_json(path)?;
    Ok(points.into_iter().map(|p| [p.x_pct, p.y_pct]).collect())
}

/// Read `[{"x": .., "y": .., "z": ..}, ...]`.
pub fn read_points3d(path: &Path) -> Result<Vec<[f64; 3]>, CliError> {
    let points: Vec<Point3> = read_json(path)?;
    Ok(points.into_iter().map(|p| [p.x, p.y, p.z]).collect())
}

/// Read a pipeline configuration; absent fields keep their defaults.
pub fn read_config(path: &Path) -> Result<PipelineConfig, CliError> {
    read_json(path)
}

#[derive(Debug, Serialize)]
struct CameraRecord {
    fx: f64,
    fy: f64,
    cx: f64,
    cy: f64,
    distortion: [f64; 5],
}

#[derive(Debug, Serialize)]
struct PoseRecord<'a> {
    rvec: [f64; 3],
    tvec: [f64; 3],
    rotation: [[f64; 3]; 3],
    order: &'a [usize],
    mean_error_px: f64,
    max_error_px: f64,
    mean_dx_px: f64,
    mean_dy_px: f64,
    camera: CameraRecord,
    center: [f64; 3],
    radius: f64,
    image_points: &'a [[f64; 2]],
    projected_anchors: &'a [[f64; 2]],
    report: &'a anchorwire_pose::PipelineReport,
}

#[derive(Debug, Serialize)]
struct WireframeRecord<'a> {
    voxel_size: f64,
    points: &'a [[f64; 3]],
    projected: &'a [[f64; 2]],
    edges: &'a [(usize, usize)],
    visible_edges: &'a [(usize, usize)],
    overlay_points: &'a [usize],
}

/// `pose.json` contents.
pub fn pose_json(output: &PipelineOutput) -> Result<String, CliError> {
    let estimate = &output.estimate;
    let intrinsics = &output.camera.intrinsics;
    let record = PoseRecord {
        rvec: estimate.pose.rvec,
        tvec: estimate.pose.translation,
        rotation: estimate.pose.rotation_matrix(),
        order: &estimate.order,
        mean_error_px: estimate.stats.mean,
        max_error_px: estimate.stats.max,
        mean_dx_px: estimate.stats.mean_dx,
        mean_dy_px: estimate.stats.mean_dy,
        camera: CameraRecord {
            fx: intrinsics.fx,
            fy: intrinsics.fy,
            cx: intrinsics.cx,
            cy: intrinsics.cy,
            distortion: output.camera.distortion.coeffs(),
        },
        center: output.frame.center,
        radius: output.frame.radius,
        image_points: &output.image_points,
        projected_anchors: &output.projected_anchors,
        report: &output.report,
    };
    Ok(serde_json::to_string_pretty(&record)?)
}

/// `wireframe.json` contents.
pub fn wireframe_json(output: &PipelineOutput) -> Result<String, CliError> {
    let scene = &output.scene;
    let record = WireframeRecord {
        voxel_size: scene.voxel_size,
        points: &scene.points,
        projected: &scene.projected,
        edges: scene.edges.edges(),
        visible_edges: &scene.visible_edges,
        overlay_points: &scene.overlay_points,
    };
    Ok(serde_json::to_string_pretty(&record)?)
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CliError {
    let path = path.to_path_buf();
    move |source| CliError::Io { path, source }
}

/// Write `pose.json` and `wireframe.json` into `out_dir`, creating it if needed.
///
/// Both documents are serialized before anything touches the disk.
pub fn write_outputs(out_dir: &Path, output: &PipelineOutput) -> Result<[PathBuf; 2], CliError> {
    let pose = pose_json(output)?;
    let wireframe = wireframe_json(output)?;

    std::fs::create_dir_all(out_dir).map_err(io_err(out_dir))?;
    let pose_path = out_dir.join("pose.json");
    let wireframe_path = out_dir.join("wireframe.json");
    std::fs::write(&pose_path, pose).map_err(io_err(&pose_path))?;
    std::fs::write(&wireframe_path, wireframe).map_err(io_err(&wireframe_path))?;
    Ok([pose_path, wireframe_path])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).expect("create file");
        file.write_all(contents.as_bytes()).expect("write file");
        path
    }

    #[test]
    fn test_read_points() -> Result<(), CliError> {
        let dir = tempfile::tempdir().expect("temp dir");
        let p2 = write_file(
            dir.path(),
            "points2d.json",
            r#"[{"xPct": 10.5, "yPct": 20.0}, {"xPct": 0, "yPct": 100}]"#,
        );
        let p3 = write_file(dir.path(), "anchors.json", r#"[{"x": 1, "y": 2.5, "z": -3}]"#);

        assert_eq!(read_points2d(&p2)?, vec![[10.5, 20.0], [0.0, 100.0]]);
        assert_eq!(read_points3d(&p3)?, vec![[1.0, 2.5, -3.0]]);
        Ok(())
    }

    #[test]
    fn test_bad_json_names_the_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write_file(dir.path(), "broken.json", r#"[{"x": 1}]"#);
        match read_points3d(&path) {
            Err(CliError::Json { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected a JSON error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let result = read_points2d(&dir.path().join("nope.json"));
        assert!(matches!(result, Err(CliError::Io { .. })));
    }

    #[test]
    fn test_read_partial_config() -> Result<(), CliError> {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write_file(dir.path(), "config.json", r#"{"bias": {"threshold_px": 5.0}}"#);
        let config = read_config(&path)?;
        assert_eq!(config.bias.threshold_px, 5.0);
        assert_eq!(config.bias.samples, 21);
        Ok(())
    }
}
