/// Miscellaneous functions that are used in other parts of the program
use core::ops::{Add, Div, Mul, Sub};
use std::path::Path;
use std::str::FromStr;

/// Interpolate an arbitrary amount of independent values between two known points
///
/// # Arguments
/// - `x0`: The first known explanatory variable
/// - `y0`: The first known independent variables
/// - `x1`: The second known explanatory variable
/// - `y1`: The second known independent variables
/// - `x`: The explanatory point at which to interpolate the independent variables
///
/// # Returns
/// The interpolated independent (y) values.
///
/// # Examples
/// ```
/// assert_eq!(interpolate_values(0_f64, &[0., 5.], 1., &[-1., 10.], 0.5), &[-0.5, 7.5]);
/// ```
///
/// # Panics
/// - The first slice of independent values is longer than the second: `y0.len()` > `y1.len()`
pub fn interpolate_values<T: Add<Output = T> + Sub<Output = T> + Mul<Output = T> + Div<Output = T> + Copy>(
    x0: T,
    y0: &[T],
    x1: T,
    y1: &[T],
    x: T,
) -> Vec<T> {
    (0..y0.len())
        .map(|i| interpolate_between_known((x0, y0[i]), (x1, y1[i]), x))
        .collect::<Vec<T>>()
}

/// Interpolate linearly between two known points
///
/// https://en.wikipedia.org/wiki/Linear_interpolation#Linear_interpolation_between_two_known_points
///
/// # Arguments
/// - `known_xy0`: The first known point as (explanatory, independent)
/// - `known_xy1`: The second known point as (explanatory, independent)
/// - `x`: The explanatory point at which to interpolate the independent variables
///
/// # Returns
/// The interpolated independent (y) value.
pub fn interpolate_between_known<T: Add<Output = T> + Sub<Output = T> + Mul<Output = T> + Div<Output = T> + Copy>(
    known_xy0: (T, T),
    known_xy1: (T, T),
    x: T,
) -> T {
    (known_xy0.1 * (known_xy1.0 - x) + known_xy1.1 * (x - known_xy0.0)) / (known_xy1.0 - known_xy0.0)
}

/// Parse the options (arguments) of a user-supplied step
///
/// Arguments are separated by whitespace within the parentheses.
///
/// # Arguments
/// - `string`: The string to parse
/// - `argument_index`: The expected index of the argument
///
/// # Examples
/// ```
/// assert_eq!(parse_option::<f64>("scale_current(20.5)", 0), Ok(Some(20.5)));
/// assert_eq!(parse_option::<String>("rotate(acc 2.0)", 0), Ok(Some("acc".to_string())));
/// assert_eq!(parse_option::<f64>("average", 1), Ok(None));
/// ```
///
/// # Returns
/// - Ok(Some(x)) where x is the successfully parsed argument
/// - Ok(None) if there is no argument in the string
/// - Err(e) if the argument could not be parsed
pub fn parse_option<T: FromStr>(string: &str, argument_index: usize) -> Result<Option<T>, String> {
    match string.split_once('(') {
        None => Ok(None),
        Some((_, first_part)) => match first_part.split_once(')') {
            Some((within_parentheses, _)) => {
                let arguments = within_parentheses.split_whitespace().collect::<Vec<&str>>();

                match arguments.get(argument_index) {
                    Some(s) => match s.parse::<T>() {
                        Ok(v) => Ok(Some(v)),
                        Err(_) => Err(format!(
                            "Could not parse argument {} as value in string {}: {}",
                            argument_index, string, s
                        )),
                    },
                    None => Err(format!("Argument {} out of bounds in string: {}", argument_index, string)),
                }
            }
            None => Err(format!("String: {} has opening parenthesis but not closing", string)),
        },
    }
}

/// Count the options (arguments) given within the parentheses of a step
///
/// A step without parentheses has no options.
pub fn count_options(string: &str) -> Result<usize, String> {
    match string.split_once('(') {
        None => Ok(0),
        Some((_, first_part)) => match first_part.split_once(')') {
            Some((within_parentheses, _)) => Ok(within_parentheses.split_whitespace().count()),
            None => Err(format!("String: {} has opening parenthesis but not closing", string)),
        },
    }
}

/// Parse a list of processing steps
///
/// The list is either comma separated ("average,split") or the path to a file with one step per
/// line. Empty lines and lines starting with "#" in step files are skipped.
pub fn parse_step_list(string: &str) -> Result<Vec<String>, String> {
    let path = Path::new(string);

    let steps: Vec<String> = match path.is_file() {
        true => std::fs::read_to_string(path)
            .map_err(|e| format!("Could not read step file {path:?}: {e}"))?
            .lines()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty() & !line.starts_with('#'))
            .map(|line| line.to_string())
            .collect(),
        false => string
            .split(',')
            .map(|step| step.trim())
            .filter(|step| !step.is_empty())
            .map(|step| step.to_string())
            .collect(),
    };

    match steps.is_empty() {
        true => Err(format!("No steps found in: {string:?}")),
        false => Ok(steps),
    }
}
