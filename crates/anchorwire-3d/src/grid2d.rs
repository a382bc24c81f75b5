use crate::error::CloudError;
use std::collections::HashMap;

/// Thin projected points with a screen-space grid.
///
/// Only points inside the `width` x `height` image (`0 <= x < width`, `0 <= y < height`) are
/// considered. Each `cell_size` square cell keeps at most `max_per_cell` points, the first ones
/// encountered. Returns the indices of the kept points in input order.
pub fn grid_decimate_2d(
    points: &[[f64; 2]],
    cell_size: f64,
    width: f64,
    height: f64,
    max_per_cell: usize,
) -> Result<Vec<usize>, CloudError> {
    if !(cell_size.is_finite() && cell_size > 0.0) {
        return Err(CloudError::InvalidCellSize(cell_size));
    }

    let mut occupancy: HashMap<(i64, i64), usize> = HashMap::new();
    let mut selected = Vec::new();
    for (i, &[x, y]) in points.iter().enumerate() {
        if !((0.0..width).contains(&x) && (0.0..height).contains(&y)) {
            continue;
        }
        let key = (
            (x / cell_size).floor() as i64,
            (y / cell_size).floor() as i64,
        );
        let count = occupancy.entry(key).or_insert(0);
        if *count < max_per_cell {
            *count += 1;
            selected.push(i);
        }
    }
    Ok(selected)
}
