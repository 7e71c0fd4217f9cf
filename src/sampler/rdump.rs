//! Writer for the R "dump" format read by JAGS for data and initial values.
//!
//! ```text
//! `RegN` <- 4
//! `w` <- c(1, 0.8, 0.6)
//! `y` <- structure(c(10, 10.2, -3, -3), .Dim = c(2L, 2L))
//! ```
//!
//! Matrices are written column-major as R expects, from the row-major
//! [`DataValue::Matrix`] layout.
use std::fmt::Write;

use itertools::Itertools;

use crate::prepare::bundle::DataValue;

/// Format one number so R reads it back exactly.
fn number(v: f64) -> String {
    if v.is_nan() {
        "NA".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "Inf" } else { "-Inf" }.to_string()
    } else {
        // `{:?}` is the shortest round-trip representation
        let s = format!("{v:?}");
        s.strip_suffix(".0").map(str::to_string).unwrap_or(s)
    }
}

/// Render a single value as an R expression.
pub fn render_value(value: &DataValue) -> String {
    match value {
        DataValue::Scalar(v) => number(*v),
        DataValue::Vector(values) => format!("c({})", values.iter().map(|v| number(*v)).join(", ")),
        DataValue::Matrix { rows, cols, values } => {
            let column_major = (0..*cols)
                .flat_map(|c| (0..*rows).map(move |r| r * cols + c))
                .map(|i| number(values[i]))
                .join(", ");
            format!("structure(c({column_major}), .Dim = c({rows}L, {cols}L))")
        }
    }
}

/// Render a set of named values, one assignment per line.
pub fn render<'a>(entries: impl IntoIterator<Item = (&'a str, &'a DataValue)>) -> String {
    let mut out = String::new();
    for (name, value) in entries {
        // writing into a String cannot fail
        let _ = writeln!(out, "`{name}` <- {}", render_value(value));
    }
    out
}

/// Render a string-valued assignment, used for the RNG name of initial values.
pub fn render_string(name: &str, value: &str) -> String {
    format!("`{name}` <- \"{value}\"\n")
}

#[cfg(test)]
mod rdump_test {
    use super::*;

    #[test]
    fn test_number_format() {
        assert_eq!(number(4.0), "4");
        assert_eq!(number(-0.25), "-0.25");
        assert_eq!(number(1e-7), "1e-7");
        assert_eq!(number(62500.0), "62500");
        assert_eq!(number(f64::NAN), "NA");
    }

    #[test]
    fn test_render_matrix_column_major() {
        let value = DataValue::Matrix {
            rows: 3,
            cols: 2,
            values: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        };
        assert_eq!(
            render_value(&value),
            "structure(c(1, 3, 5, 2, 4, 6), .Dim = c(3L, 2L))"
        );
    }

    #[test]
    fn test_render_entries() {
        let regn = DataValue::Scalar(4.0);
        let w = DataValue::Vector(vec![1.0, 0.5]);
        let out = render([("RegN", &regn), ("w", &w)]);
        assert_eq!(out, "`RegN` <- 4\n`w` <- c(1, 0.5)\n");
        assert_eq!(
            render_string(".RNG.name", "base::Mersenne-Twister"),
            "`.RNG.name` <- \"base::Mersenne-Twister\"\n"
        );
    }
}
