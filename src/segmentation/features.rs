use ndarray::{Array2, Array4, ArrayView2, ArrayView3, Axis};

/// Statistics stored per channel in the texture tensor
pub const TEXTURE_STATS: usize = 6;

/// Guards the normalised moments against near-zero denominators
const EPSILON: f32 = 1e-3;

/// Local window radius (3x3 window)
const RADIUS: isize = 1;

/// Per-pixel local texture descriptor, shape [height, width, channels, TEXTURE_STATS]
///
/// Stat order along the last axis: second raw moment, mean, standard deviation,
/// normalised variance, skewness, kurtosis.
pub type TextureTensor = Array4<f32>;

/// Compute sliding-window texture statistics for every pixel of `roi`
///
/// Each channel is processed independently with a 3x3 box window and
/// symmetric boundary handling (the edge sample is repeated).
pub fn texture_features(roi: ArrayView3<f32>) -> TextureTensor {
    let _span = tracing::debug_span!("texture").entered();

    let (height, width, channels) = roi.dim();
    let mut tensor = Array4::<f32>::zeros((height, width, channels, TEXTURE_STATS));

    for (c, plane) in roi.axis_iter(Axis(2)).enumerate() {
        let mean = box_filter(plane, |v| v);
        let asm = box_filter(plane, |v| v * v);

        let deviation = &plane - &mean;
        let dev2 = box_filter(deviation.view(), |d| d * d);
        let dev3 = box_filter(deviation.view(), |d| d * d * d);
        let dev4 = box_filter(deviation.view(), |d| d * d * d * d);

        for y in 0..height {
            for x in 0..width {
                let m = mean[[y, x]];
                let sd = dev2[[y, x]].max(0.0).sqrt();
                let norm = sd + EPSILON;

                let stats = [
                    asm[[y, x]],
                    m,
                    sd,
                    sd / (m + EPSILON),
                    dev3[[y, x]] / norm.powi(3),
                    dev4[[y, x]] / norm.powi(4),
                ];
                for (k, value) in stats.into_iter().enumerate() {
                    tensor[[y, x, c, k]] = value;
                }
            }
        }
    }

    tensor
}

/// Euclidean distance between the descriptors of two pixels, clamped to [0, 1]
pub fn texture_distance(texture: &TextureTensor, p: (usize, usize), q: (usize, usize)) -> f32 {
    let a = texture.slice(ndarray::s![p.0, p.1, .., ..]);
    let b = texture.slice(ndarray::s![q.0, q.1, .., ..]);

    let squared: f32 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
    let distance = squared.sqrt();

    if distance.is_nan() {
        1.0
    } else {
        distance.clamp(0.0, 1.0)
    }
}

/// Symmetric boundary: index -1 maps to 0, index len maps to len - 1
fn reflect(i: isize, len: usize) -> usize {
    let len = len as isize;
    let period = 2 * len;
    let r = i.rem_euclid(period);
    if r < len {
        r as usize
    } else {
        (period - 1 - r) as usize
    }
}

/// Mean of `f(sample)` over the 3x3 neighbourhood of every pixel
fn box_filter(plane: ArrayView2<f32>, f: impl Fn(f32) -> f32) -> Array2<f32> {
    let (height, width) = plane.dim();
    let window = ((2 * RADIUS + 1) * (2 * RADIUS + 1)) as f32;

    Array2::from_shape_fn((height, width), |(y, x)| {
        let mut sum = 0.0f32;
        for dy in -RADIUS..=RADIUS {
            let sy = reflect(y as isize + dy, height);
            for dx in -RADIUS..=RADIUS {
                let sx = reflect(x as isize + dx, width);
                sum += f(plane[[sy, sx]]);
            }
        }
        sum / window
    })
}
