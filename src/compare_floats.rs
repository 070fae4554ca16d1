pub fn min_of_2<T: PartialOrd + Copy>(first: T, second: T) -> T {
    if first < second {
        first
    } else {
        second
    }
}

pub fn max_of_2<T: PartialOrd + Copy>(first: T, second: T) -> T {
    if first > second {
        first
    } else {
        second
    }
}

/// Clamp `value` into `[lower, upper]`. Unlike `f64::clamp` this does not panic when the bounds
/// are inverted; the lower bound wins.
pub(crate) fn clamp_between(value: f64, lower: f64, upper: f64) -> f64 {
    max_of_2(min_of_2(value, upper), lower)
}
