/// Centred moving average in elapsed time: each output is the mean of the
/// points within `window_s / 2` seconds either side. Points must be
/// time-ordered; the output has the same length as the input.
pub fn centred_moving_average(points: &[(f64, f64)], window_s: f64) -> Vec<f64> {
    let half = window_s / 2.0;
    let mut smoothed = Vec::with_capacity(points.len());
    let mut left = 0;
    let mut right = 0;
    let mut sum = 0.0;

    for &(t, _) in points {
        while right < points.len() && points[right].0 <= t + half {
            sum += points[right].1;
            right += 1;
        }
        while points[left].0 < t - half {
            sum -= points[left].1;
            left += 1;
        }
        smoothed.push(sum / (right - left) as f64);
    }
    smoothed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_neighbours_within_half_window() {
        let points = [(0.0, 1.0), (5.0, 2.0), (10.0, 3.0), (15.0, 4.0), (20.0, 5.0)];
        let smoothed = centred_moving_average(&points, 10.0);
        assert_eq!(smoothed.len(), 5);
        assert!((smoothed[0] - 1.5).abs() < 1e-12);
        assert!((smoothed[2] - 3.0).abs() < 1e-12);
        assert!((smoothed[4] - 4.5).abs() < 1e-12);
    }

    #[test]
    fn narrow_window_is_identity() {
        let points = [(0.0, 7.0), (3.0, 1.0), (6.0, 4.0)];
        assert_eq!(centred_moving_average(&points, 1.0), vec![7.0, 1.0, 4.0]);
    }
}
