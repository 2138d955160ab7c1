//! Ages and growth charts.
//!
//! Measurements are taken at irregular dates; charts compare people at fixed
//! ages. [`values_at_ages`] linearly interpolates a person's measurements at
//! each requested age, and [`FamilyDb::height_chart`] /
//! [`FamilyDb::weight_chart`] aggregate those values across people.

use chrono::{DateTime, Datelike, Utc};
use kinship_state::Window;
use kinship_store::{ReadAccess, StorageBackend};
use kinship_types::PersonId;
use serde::Serialize;

use crate::{
    db::FamilyDb,
    error::{DomainError, Result},
};

const DAYS_PER_YEAR: f64 = 365.25;

/// Whole years and months elapsed from `birthday` to `at`.
pub fn age_parts(birthday: DateTime<Utc>, at: DateTime<Utc>) -> (i32, i32) {
    let mut years = at.year() - birthday.year();
    let mut months = at.month() as i32 - birthday.month() as i32;
    if at.day() < birthday.day() {
        months -= 1;
    }
    if months < 0 {
        years -= 1;
        months += 12;
    }
    (years, months)
}

/// Human-readable age, such as `3 years and 2 months`.
pub fn describe_age(birthday: DateTime<Utc>, at: DateTime<Utc>, include_months: bool) -> String {
    let (years, months) = age_parts(birthday, at);
    if include_months { format!("{years} years and {months} months") } else { format!("{years} years") }
}

/// Fractional age in years.
pub fn age_in_years(birthday: DateTime<Utc>, at: DateTime<Utc>) -> f64 {
    (at - birthday).num_seconds() as f64 / (DAYS_PER_YEAR * 86_400.0)
}

/// A measurement placed on the age axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthPoint {
    /// Age in years.
    pub age: f64,
    /// Measured value.
    pub value: f64,
}

/// Values at each of `ages`, linearly interpolated between `points`.
///
/// `points` must be sorted by age. An age before the first point or after
/// the last yields `None`; no extrapolation is done.
pub fn values_at_ages(points: &[GrowthPoint], ages: &[f64]) -> Vec<Option<f64>> {
    ages.iter().map(|&age| value_at(points, age)).collect()
}

fn value_at(points: &[GrowthPoint], age: f64) -> Option<f64> {
    let after = points.iter().position(|p| p.age >= age)?;
    let hi = points[after];
    if hi.age == age {
        return Some(hi.value);
    }
    let lo = *points.get(after.checked_sub(1)?)?;
    Some(lo.value + (hi.value - lo.value) / (hi.age - lo.age) * (age - lo.age))
}

/// Chart row: one target age across several people.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartRow {
    /// Target age in years.
    pub age: f64,
    /// Mean of the known values, if any.
    pub average: Option<f64>,
    /// One value per person, in the order requested.
    pub values: Vec<Option<f64>>,
}

fn chart(ages: &[f64], series: &[Vec<Option<f64>>]) -> Vec<ChartRow> {
    ages.iter()
        .enumerate()
        .map(|(i, &age)| {
            let values: Vec<Option<f64>> = series.iter().map(|s| s[i]).collect();
            let known: Vec<f64> = values.iter().flatten().copied().collect();
            let average = (!known.is_empty()).then(|| known.iter().sum::<f64>() / known.len() as f64);
            ChartRow { age, average, values }
        })
        .collect()
}

impl<B: StorageBackend> FamilyDb<B> {
    fn require_person<T: ReadAccess + ?Sized>(&self, tx: &T, id: PersonId) -> Result<DateTime<Utc>> {
        let person = self.person(tx, id)?.ok_or(DomainError::NotFound { kind: "person", id: id.value() })?;
        Ok(person.birthday)
    }

    /// Heights of `person` placed on the age axis.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] if the person does not exist.
    pub fn height_points<T: ReadAccess + ?Sized>(&self, tx: &T, person: PersonId) -> Result<Vec<GrowthPoint>> {
        let birthday = self.require_person(tx, person)?;
        Ok(self
            .heights_for_person(tx, person, Window::all())?
            .into_iter()
            .map(|h| GrowthPoint { age: age_in_years(birthday, h.date), value: h.inches })
            .collect())
    }

    /// Weights of `person` placed on the age axis.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] if the person does not exist.
    pub fn weight_points<T: ReadAccess + ?Sized>(&self, tx: &T, person: PersonId) -> Result<Vec<GrowthPoint>> {
        let birthday = self.require_person(tx, person)?;
        Ok(self
            .weights_for_person(tx, person, Window::all())?
            .into_iter()
            .map(|w| GrowthPoint { age: age_in_years(birthday, w.date), value: w.pounds })
            .collect())
    }

    /// Height of each of `people` at each of `ages`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] if a person does not exist.
    pub fn height_chart<T: ReadAccess + ?Sized>(
        &self,
        tx: &T,
        people: &[PersonId],
        ages: &[f64],
    ) -> Result<Vec<ChartRow>> {
        let series = people
            .iter()
            .map(|&person| Ok(values_at_ages(&self.height_points(tx, person)?, ages)))
            .collect::<Result<Vec<_>>>()?;
        Ok(chart(ages, &series))
    }

    /// Weight of each of `people` at each of `ages`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] if a person does not exist.
    pub fn weight_chart<T: ReadAccess + ?Sized>(
        &self,
        tx: &T,
        people: &[PersonId],
        ages: &[f64],
    ) -> Result<Vec<ChartRow>> {
        let series = people
            .iter()
            .map(|&person| Ok(values_at_ages(&self.weight_points(tx, person)?, ages)))
            .collect::<Result<Vec<_>>>()?;
        Ok(chart(ages, &series))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use chrono::TimeZone;
    use proptest::prelude::*;

    use super::*;

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).single().unwrap()
    }

    fn point(age: f64, value: f64) -> GrowthPoint {
        GrowthPoint { age, value }
    }

    #[test]
    fn test_age_before_and_after_birthday_in_month() {
        let birthday = day(2020, 6, 15);
        assert_eq!(age_parts(birthday, day(2023, 6, 15)), (3, 0));
        assert_eq!(age_parts(birthday, day(2023, 6, 14)), (2, 11));
        assert_eq!(age_parts(birthday, day(2023, 8, 20)), (3, 2));
        assert_eq!(age_parts(birthday, day(2024, 1, 1)), (3, 6));
    }

    #[test]
    fn test_describe_age() {
        let birthday = day(2020, 6, 15);
        assert_eq!(describe_age(birthday, day(2023, 8, 20), true), "3 years and 2 months");
        assert_eq!(describe_age(birthday, day(2023, 8, 20), false), "3 years");
    }

    #[test]
    fn test_exact_point_is_returned_unchanged() {
        let points = [point(1.0, 30.0), point(2.0, 34.0)];
        assert_eq!(values_at_ages(&points, &[1.0, 2.0]), vec![Some(30.0), Some(34.0)]);
    }

    #[test]
    fn test_interpolates_between_points() {
        let points = [point(1.0, 30.0), point(3.0, 38.0)];
        assert_eq!(values_at_ages(&points, &[2.0]), vec![Some(34.0)]);
    }

    #[test]
    fn test_no_extrapolation() {
        let points = [point(1.0, 30.0), point(3.0, 38.0)];
        assert_eq!(values_at_ages(&points, &[0.5, 4.0]), vec![None, None]);
        assert_eq!(values_at_ages(&[], &[1.0]), vec![None]);
    }

    #[test]
    fn test_chart_averages_known_values() {
        let rows = chart(&[1.0, 2.0], &[vec![Some(30.0), None], vec![Some(32.0), None]]);
        assert_eq!(rows[0].average, Some(31.0));
        assert_eq!(rows[1].average, None);
        assert_eq!(rows[1].values, vec![None, None]);
    }

    proptest! {
        #[test]
        fn prop_interpolation_stays_between_neighbours(
            a in 0.0f64..10.0,
            gap in 0.1f64..5.0,
            lo in 10.0f64..60.0,
            rise in 0.0f64..20.0,
            t in 0.0f64..1.0,
        ) {
            let points = [point(a, lo), point(a + gap, lo + rise)];
            let value = values_at_ages(&points, &[a + gap * t])[0].unwrap();
            prop_assert!(value >= lo - 1e-9 && value <= lo + rise + 1e-9);
        }
    }
}
