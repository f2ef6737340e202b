//! Wigner rotation matrices for integral and half-integral angular momenta.

use factorial::Factorial;
use ndarray::{Array2, Axis};
use num::complex::Complex;

#[cfg(test)]
#[path = "spinor_rotation_3d_tests.rs"]
mod spinor_rotation_3d_tests;

/// Returns an element in the Wigner rotation matrix for an integral or half-integral
/// $`j`$, defined by
///
/// ```math
/// \hat{R}(\alpha, \beta, \gamma) \ket{jm}
/// = \sum_{m'} \ket{jm'} D^{(j)}_{m'm}(\alpha, \beta, \gamma)
/// = \sum_{m'} \ket{jm'} e^{-i\alpha m'} d^{(j)}_{m'm}(\beta) e^{-i\gamma m}.
/// ```
///
/// The small-$`d`$ element is evaluated with Wigner's factorial sum,
///
/// ```math
/// d^{(j)}_{m'm}(\beta)
/// = \sqrt{(j+m')!(j-m')!(j+m)!(j-m)!}
///   \sum_w \frac{(-1)^w}{(j+m'-w)!(j-m-w)!w!(w+m-m')!}
///   \cos^{2j+m'-m-2w}(\beta/2) \sin^{2w+m-m'}(\beta/2),
/// ```
///
/// where only terms with non-negative factorial arguments contribute.
///
/// # Arguments
///
/// * `twoj` - Two times the angular momentum $`2j`$. If this is even, $`j`$ is integral;
/// otherwise, $`j`$ is half-integral.
/// * `mdashi` - Index for $`m'`$ given by $`m'+j`$.
/// * `mi` - Index for $`m`$ given by $`m+j`$.
/// * `euler_angles` - A triplet of Euler angles $`(\alpha, \beta, \gamma)`$ in radians, following
/// the $`zyz`$ convention.
///
/// # Returns
///
/// The element $`D^{(j)}_{m'm}(\alpha, \beta, \gamma)`$.
fn dmat_euler_gen_element(
    twoj: u32,
    mdashi: usize,
    mi: usize,
    euler_angles: (f64, f64, f64),
) -> Complex<f64> {
    let (alpha, beta, gamma) = euler_angles;
    let twoj_i = i64::from(twoj);
    let mdashi_i = mdashi as i64;
    let mi_i = mi as i64;
    let fact = |n: i64| -> f64 {
        u64::try_from(n)
            .ok()
            .and_then(|n| n.checked_factorial())
            .map(|f| f as f64)
            .unwrap_or(f64::NAN)
    };

    let prefactor =
        (fact(mi_i) * fact(twoj_i - mi_i) * fact(mdashi_i) * fact(twoj_i - mdashi_i)).sqrt();
    let (sinb2, cosb2) = (beta / 2.0).sin_cos();
    let d: f64 = (0..=mdashi_i)
        .filter(|&w| twoj_i - mi_i - w >= 0 && w + mi_i - mdashi_i >= 0)
        .map(|w| {
            let sign = if w % 2 == 0 { 1.0 } else { -1.0 };
            let denom =
                fact(mdashi_i - w) * fact(twoj_i - mi_i - w) * fact(w) * fact(w + mi_i - mdashi_i);
            let cos_pow = i32::try_from(twoj_i - mi_i + mdashi_i - 2 * w).unwrap_or(0);
            let sin_pow = i32::try_from(2 * w + mi_i - mdashi_i).unwrap_or(0);
            sign / denom * cosb2.powi(cos_pow) * sinb2.powi(sin_pow)
        })
        .sum();

    let mdash = mdashi as f64 - f64::from(twoj) / 2.0;
    let m = mi as f64 - f64::from(twoj) / 2.0;
    let i = Complex::<f64>::i();
    (-i * (alpha * mdash + gamma * m)).exp() * (prefactor * d)
}

/// Returns the Wigner rotation matrix for an integral or half-integral $`j`$, whose elements are
/// defined by
///
/// ```math
/// \hat{R}(\alpha, \beta, \gamma) \ket{jm}
/// = \sum_{m'} \ket{jm'} D^{(j)}_{m'm}(\alpha, \beta, \gamma).
/// ```
///
/// # Arguments
///
/// * `twoj` - Two times the angular momentum $`2j`$.
/// * `euler_angles` - A triplet of Euler angles $`(\alpha, \beta, \gamma)`$ in radians, following
/// the $`zyz`$ convention.
/// * `increasingm` - If `true`, the rows and columns of $`\mathbf{D}^{(j)}`$ are
/// arranged in increasing order of $`m = -j, \ldots, j`$. If `false`, the order is reversed.
///
/// # Returns
///
/// The matrix $`\mathbf{D}^{(j)}(\alpha, \beta, \gamma)`$ of dimensions
/// $`(2j+1) \times (2j+1)`$.
#[must_use]
pub fn dmat_euler_gen(
    twoj: u32,
    euler_angles: (f64, f64, f64),
    increasingm: bool,
) -> Array2<Complex<f64>> {
    let dim = twoj as usize + 1;
    let mut dmat = Array2::<Complex<f64>>::from_shape_fn((dim, dim), |(mdashi, mi)| {
        dmat_euler_gen_element(twoj, mdashi, mi, euler_angles)
    });
    if !increasingm {
        dmat.invert_axis(Axis(0));
        dmat.invert_axis(Axis(1));
    }
    dmat
}
