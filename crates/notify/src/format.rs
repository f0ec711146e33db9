//! Short human rendering of metric values.
//!
//! Values with magnitude of 1000 or more use SI prefixes (`1.5 k`, `2.35 M`);
//! smaller ones are printed as plain decimals. Trailing zeros are trimmed
//! in both cases.

/// Renders metric values with a fixed number of fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueFormatter {
    precision: usize,
}

const SI_PREFIXES: &[(i32, &str)] = &[
    (-24, "y"),
    (-21, "z"),
    (-18, "a"),
    (-15, "f"),
    (-12, "p"),
    (-9, "n"),
    (-6, "µ"),
    (-3, "m"),
    (0, ""),
    (3, "k"),
    (6, "M"),
    (9, "G"),
    (12, "T"),
    (15, "P"),
    (18, "E"),
    (21, "Z"),
    (24, "Y"),
];

impl ValueFormatter {
    /// Precision used for SMS lines.
    pub const SMS: Self = Self::new(2);
    /// Precision used for email rows.
    pub const EMAIL: Self = Self::new(10);

    pub const fn new(precision: usize) -> Self {
        Self { precision }
    }

    pub fn format(&self, value: f64) -> String {
        if value.abs() >= 1000.0 {
            self.format_si(value)
        } else {
            self.format_plain(value)
        }
    }

    /// Format an optional value; `None` renders as zero.
    pub fn format_opt(&self, value: Option<f64>) -> String {
        self.format(value.unwrap_or(0.0))
    }

    fn format_plain(&self, value: f64) -> String {
        strip_trailing_zeros(format!("{:.*}", self.precision, value))
    }

    fn format_si(&self, value: f64) -> String {
        let (scaled, prefix) = compute_si(value);
        format!("{} {}", self.format_plain(scaled), prefix)
    }
}

/// Split `value` into a mantissa in `[1, 1000)` and its SI prefix.
fn compute_si(value: f64) -> (f64, &'static str) {
    if value == 0.0 || !value.is_finite() {
        return (value, "");
    }
    let magnitude = value.abs();
    let mut exponent = (magnitude.log10().floor() as i32).div_euclid(3) * 3;
    // log10 can land just below an exact power of ten
    if magnitude / 10f64.powi(exponent) >= 1000.0 {
        exponent += 3;
    }
    let exponent = exponent.clamp(-24, 24);
    let scaled = magnitude / 10f64.powi(exponent);
    let prefix = SI_PREFIXES
        .iter()
        .find(|(exp, _)| *exp == exponent)
        .map(|(_, p)| *p)
        .unwrap_or("");
    (scaled.copysign(value), prefix)
}

fn strip_trailing_zeros(mut s: String) -> String {
    if s.contains('.') {
        let trimmed = s.trim_end_matches('0').trim_end_matches('.').len();
        s.truncate(trimmed);
    }
    if s == "-0" {
        s.remove(0);
    }
    s
}
