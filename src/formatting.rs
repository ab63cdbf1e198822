#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    #[default]
    #[value(name = "float")]
    Float,
    #[value(name = "percent")]
    Percent,
    #[value(name = "sci")]
    Scientific,
}

impl Format {
    pub fn format(&self, value: f64) -> String {
        match self {
            Format::Float => format!("{:.4}", value),
            Format::Percent => format_percent(value),
            Format::Scientific => format!("{:.3e}", value),
        }
    }
}

/// Fractions as percentages, e.g. log-returns: 0.0123 becomes "1.23%".
pub fn format_percent(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

/// Factor and suffix for plot axes, so the x axis reads in the same unit as
/// the table.
pub fn display_scale(format: Format) -> (f64, &'static str) {
    match format {
        Format::Percent => (100.0, "%"),
        Format::Float | Format::Scientific => (1.0, ""),
    }
}

/// Relative error of a bucket weight, rendered for the per-bucket report.
pub fn format_relative_error(weight: f64, std_error: f64) -> String {
    if weight > 0.0 {
        format!("±{:.1}%", 100.0 * std_error / weight)
    } else {
        "-".to_string()
    }
}
