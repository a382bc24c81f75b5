use anchorwire_pose::{run, ImageSize, NumericPoseSolver, PipelineConfig, PipelineInput};
use argh::FromArgs;
use std::path::PathBuf;

mod io;

use io::{read_config, read_points2d, read_points3d, write_outputs, CliError};

/// Recover the camera pose from anchor correspondences and project the BIM wireframe
#[derive(Debug, FromArgs)]
struct Args {
    /// image points as [{"xPct", "yPct"}] in percent of the image size
    #[argh(option)]
    points2d: PathBuf,

    /// anchor coordinates as [{"x", "y", "z"}], paired with the image points by position
    #[argh(option)]
    anchors: PathBuf,

    /// BIM point cloud as [{"x", "y", "z"}]
    #[argh(option)]
    bim: PathBuf,

    /// image width in pixels
    #[argh(option)]
    width: usize,

    /// image height in pixels
    #[argh(option)]
    height: usize,

    /// output directory for pose.json and wireframe.json
    #[argh(option, default = "PathBuf::from(\"out\")")]
    out: PathBuf,

    /// horizontal field of view in degrees (default 91)
    #[argh(option)]
    fov_h: Option<f64>,

    /// vertical field of view in degrees (default: square pixels)
    #[argh(option)]
    fov_v: Option<f64>,

    /// disable the anchor re-assignment search
    #[argh(switch)]
    no_perm: bool,

    /// JSON pipeline configuration; flags override it
    #[argh(option)]
    config: Option<PathBuf>,
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(fov_h) = self.fov_h {
            config.fov.horizontal_deg = fov_h;
        }
        if self.fov_v.is_some() {
            config.fov.vertical_deg = self.fov_v;
        }
        if self.no_perm {
            config.solver.permutation.enabled = false;
        }
        Ok(config)
    }
}

fn execute(args: &Args) -> Result<[PathBuf; 2], CliError> {
    let config = args.pipeline_config()?;
    let input = PipelineInput {
        image_pct: read_points2d(&args.points2d)?,
        anchors: read_points3d(&args.anchors)?,
        bim: read_points3d(&args.bim)?,
        size: ImageSize::new(args.width, args.height)?,
    };
    log::info!(
        "{} image points, {} anchors, {} BIM points, image {}",
        input.image_pct.len(),
        input.anchors.len(),
        input.bim.len(),
        input.size
    );

    let output = run(&NumericPoseSolver::default(), &input, &config)?;
    let paths = write_outputs(&args.out, &output)?;

    println!(
        "pose: rvec {:?} t {:?}",
        output.estimate.pose.rvec, output.estimate.pose.translation
    );
    println!(
        "reprojection: mean {:.2} px, max {:.2} px, order {:?}",
        output.estimate.mean_error(),
        output.estimate.max_error(),
        output.estimate.order
    );
    println!(
        "wireframe: {} points, {} edges ({} visible)",
        output.scene.points.len(),
        output.scene.edges.len(),
        output.scene.visible_edges.len()
    );
    Ok(paths)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let [pose, wireframe] = execute(&args)?;
    println!("wrote {} and {}", pose.display(), wireframe.display());
    Ok(())
}
