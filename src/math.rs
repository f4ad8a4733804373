use std::iter;

pub trait IteratorAvg<T>: Iterator<Item = T> {
    fn avg(self) -> Option<T>;
    fn avg_with_std(self) -> Option<(T, T)>;
    fn std(self) -> Option<T>;
}

macro_rules! impl_avg {
    ($($a:ident)*) => ($(
        impl<I> IteratorAvg<$a> for I
        where
            I: Iterator<Item = $a>,
        {
            fn avg(self) -> Option<$a> {
                iter::zip(self, 1usize..)
                    .reduce(|(sum, _), (next, cnt)| (sum + next, cnt))
                    .map(|(sum, cnt)| sum / cnt as $a)
            }

            fn avg_with_std(self) -> Option<($a, $a)> {
                let values = self.collect::<Vec<_>>();
                let avg = values.iter().copied().avg()?;
                values
                    .into_iter()
                    .map(|x| (x - avg).powi(2))
                    .avg()
                    .map(|std| (avg, std.sqrt()))
            }

            fn std(self) -> Option<$a> {
                self.avg_with_std().map(|(_, std)| std)
            }
        }
    )*)
}

impl_avg! { f32 f64 }

/// Ordinary least squares fit `y = intercept + slope * x`.
///
/// `None` with fewer than two points or when all `x` coincide.
pub fn linear_regression(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.len() < 2 {
        return None;
    }
    let x_avg = points.iter().map(|p| p.0).avg()?;
    let y_avg = points.iter().map(|p| p.1).avg()?;
    let (sxy, sxx) = points.iter().fold((0.0, 0.0), |(sxy, sxx), &(x, y)| {
        let dx = x - x_avg;
        (sxy + dx * (y - y_avg), sxx + dx * dx)
    });
    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some((y_avg - slope * x_avg, slope))
}
