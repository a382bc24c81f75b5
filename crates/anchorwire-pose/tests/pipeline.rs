use anchorwire_pnp::{project_points, Pose};
use anchorwire_pose::{
    camera_from_fov, correct_vertical_bias, evaluate_pose, run, solve_pose, BiasCorrectionParams,
    BiasOutcome, Correspondences, FieldOfView, ImageSize, NumericPoseSolver, PermutationOutcome,
    PipelineConfig, PipelineError, PipelineInput, PoseEstimate, PoseSolverParams,
    ReprojectionStats,
};
use approx::assert_relative_eq;

fn anchors() -> Vec<[f64; 3]> {
    vec![
        [-3.0, -2.0, 0.5],
        [3.0, -2.0, -0.5],
        [3.0, 2.0, 1.0],
        [-3.0, 2.0, 0.0],
        [0.0, 0.0, 2.0],
        [1.5, -1.0, -1.5],
    ]
}

fn bim_around(center: [f64; 3]) -> Vec<[f64; 3]> {
    let mut pts = Vec::new();
    for i in -8..=8 {
        for j in -6..=6 {
            pts.push([
                center[0] + i as f64 * 0.5,
                center[1] + j as f64 * 0.5,
                center[2],
            ]);
        }
    }
    pts
}

/// Image points, in percent, of `anchors` seen by the default 91 degree camera.
fn observe(anchors: &[[f64; 3]], size: ImageSize, pose: &Pose) -> Vec<[f64; 2]> {
    let camera = camera_from_fov(size, &FieldOfView::default()).expect("valid camera");
    let c = Correspondences::from_pixels(vec![[0.0; 2]; anchors.len()], anchors.to_vec())
        .expect("valid anchors");
    project_points(c.centered_anchors(), pose, &camera)
        .into_iter()
        .map(|[u, v]| [u / size.width_f64() * 100.0, v / size.height_f64() * 100.0])
        .collect()
}

#[test]
fn unit_square_frontal_view() -> Result<(), PipelineError> {
    let size = ImageSize::new(2, 2)?;
    let camera = camera_from_fov(
        size,
        &FieldOfView {
            horizontal_deg: 90.0,
            vertical_deg: None,
        },
    )?;
    let square = vec![
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
    ];
    let pixels = vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
    let c = Correspondences::from_pixels(pixels, square)?;

    let outcome = solve_pose(
        &NumericPoseSolver::default(),
        &c,
        &camera,
        &PoseSolverParams::default(),
    )?;
    let estimate = outcome.estimate;
    assert!(estimate.mean_error() < 1.0);
    assert!(estimate.pose.is_finite());
    assert_eq!(estimate.order, vec![0, 1, 2, 3]);
    for k in 0..3 {
        assert_relative_eq!(estimate.pose.rvec[k], 0.0, epsilon = 1e-6);
    }
    assert_relative_eq!(estimate.pose.translation[0], -0.5, epsilon = 1e-6);
    assert_relative_eq!(estimate.pose.translation[1], -0.5, epsilon = 1e-6);
    assert_relative_eq!(estimate.pose.translation[2], 1.0, epsilon = 1e-6);
    assert_eq!(outcome.report.permutation, PermutationOutcome::NotNeeded);
    Ok(())
}

#[test]
fn swapped_pair_is_reassigned() -> Result<(), PipelineError> {
    let size = ImageSize::new(640, 480)?;
    let pose = Pose::new([0.1, -0.2, 0.05], [0.2, -0.1, 12.0]);
    let mut image_pct = observe(&anchors(), size, &pose);
    image_pct.swap(0, 2);

    let input = PipelineInput {
        image_pct,
        anchors: anchors(),
        bim: bim_around([0.0, 0.0, 0.0]),
        size,
    };
    let output = run(&NumericPoseSolver::default(), &input, &PipelineConfig::default())?;

    let solve = &output.report.solve;
    assert!(solve.initial_error.mean > 25.0);
    match &solve.permutation {
        PermutationOutcome::Improved { before, after, .. } => assert!(after < before),
        other => panic!("expected the search to improve, got {other:?}"),
    }
    assert_eq!(output.estimate.order, vec![2, 1, 0, 3, 4, 5]);
    assert!(output.estimate.mean_error() < 1e-3);
    assert!(output.estimate.mean_error() < solve.initial_error.mean);
    assert!(matches!(output.report.bias, BiasOutcome::NotNeeded { .. }));

    // the reported error is the error of the reported pose
    let c = Correspondences::from_percent(&input.image_pct, &input.anchors, size)?;
    let world = c.reordered_anchors(&output.estimate.order);
    let projected = project_points(&world, &output.estimate.pose, &output.camera);
    let stats = ReprojectionStats::from_points(&projected, c.image_points());
    assert_relative_eq!(stats.mean, output.estimate.stats.mean, epsilon = 1e-12);
    assert_relative_eq!(stats.max, output.estimate.stats.max, epsilon = 1e-12);
    assert_eq!(output.projected_anchors, projected);

    for k in 0..3 {
        assert_relative_eq!(output.estimate.pose.translation[k], pose.translation[k], epsilon = 1e-4);
    }
    assert!(!output.scene.edges.is_empty());
    for &(i, j) in output.scene.edges.edges() {
        assert!(i < j);
        let d = anchorwire_3d::euclidean_distance(&output.scene.points[i], &output.scene.points[j]);
        assert!(d < 4.0 * output.scene.voxel_size);
    }
    Ok(())
}

#[test]
fn disabled_search_keeps_the_given_order() -> Result<(), PipelineError> {
    let size = ImageSize::new(640, 480)?;
    let pose = Pose::new([0.1, -0.2, 0.05], [0.2, -0.1, 12.0]);
    let mut image_pct = observe(&anchors(), size, &pose);
    image_pct.swap(0, 2);

    let mut config = PipelineConfig::default();
    config.solver.permutation.enabled = false;
    let input = PipelineInput {
        image_pct,
        anchors: anchors(),
        bim: bim_around([0.0, 0.0, 0.0]),
        size,
    };
    let output = run(&NumericPoseSolver::default(), &input, &config)?;
    assert_eq!(output.report.solve.permutation, PermutationOutcome::Disabled);
    assert_eq!(output.estimate.order, vec![0, 1, 2, 3, 4, 5]);
    Ok(())
}

#[test]
fn wrong_vertical_focal_is_recovered() -> Result<(), PipelineError> {
    let size = ImageSize::new(2000, 1500)?;
    let assumed = camera_from_fov(size, &FieldOfView::default())?;
    let params = BiasCorrectionParams::default();
    let true_scale = params.scales()[18];
    let actual = assumed.with_fy(assumed.intrinsics.fy * true_scale);

    // the anchors sit below the optical axis, so the fy error is one-sided in v
    let pose = Pose::new([0.05, -0.1, 0.02], [0.3, 4.0, 12.0]);
    let c = Correspondences::from_pixels(vec![[0.0; 2]; anchors().len()], anchors())?;
    let image = project_points(c.centered_anchors(), &pose, &actual);
    let c = Correspondences::from_pixels(image, anchors())?;

    let solver = NumericPoseSolver::default();
    let order: Vec<usize> = (0..c.len()).collect();
    let estimate = PoseEstimate {
        pose,
        stats: evaluate_pose(&solver, &c, &assumed, &pose, &order),
        order,
    };
    assert!(estimate.stats.mean_dy.abs() > params.threshold_px);

    let corrected = correct_vertical_bias(&solver, &c, &assumed, &estimate, &params);
    match corrected.outcome {
        BiasOutcome::Corrected {
            scale,
            fy_after,
            dy_before,
            dy_after,
            ..
        } => {
            assert_relative_eq!(scale, 1.08, epsilon = 1e-9);
            assert_relative_eq!(fy_after, actual.intrinsics.fy, epsilon = 1e-6);
            assert!(dy_after.abs() < 1e-3);
            assert!(dy_after.abs() < dy_before.abs());
        }
        other => panic!("expected a corrected camera, got {other:?}"),
    }
    assert_eq!(corrected.camera.intrinsics.fx, assumed.intrinsics.fx);
    assert!(corrected.estimate.mean_error() < 1e-3);
    for k in 0..3 {
        assert_relative_eq!(
            corrected.estimate.pose.translation[k],
            pose.translation[k],
            epsilon = 1e-4
        );
    }
    Ok(())
}

#[test]
fn fatal_errors_abort_the_run() -> Result<(), PipelineError> {
    let size = ImageSize::new(640, 480)?;
    let pose = Pose::new([0.0; 3], [0.0, 0.0, 12.0]);
    let solver = NumericPoseSolver::default();

    let few = PipelineInput {
        image_pct: observe(&anchors(), size, &pose)[..3].to_vec(),
        anchors: anchors(),
        bim: bim_around([0.0; 3]),
        size,
    };
    assert!(matches!(
        run(&solver, &few, &PipelineConfig::default()),
        Err(PipelineError::InsufficientCorrespondences { actual: 3, .. })
    ));

    let mut config = PipelineConfig::default();
    config.fov.horizontal_deg = 180.0;
    let ok_input = PipelineInput {
        image_pct: observe(&anchors(), size, &pose),
        anchors: anchors(),
        bim: bim_around([0.0; 3]),
        size,
    };
    assert!(matches!(
        run(&solver, &ok_input, &config),
        Err(PipelineError::InvalidFov(_))
    ));

    let far = PipelineInput {
        bim: bim_around([1000.0, 0.0, 0.0]),
        ..ok_input
    };
    assert!(matches!(
        run(&solver, &far, &PipelineConfig::default()),
        Err(PipelineError::NoNearbyBimPoints { .. })
    ));
    Ok(())
}
