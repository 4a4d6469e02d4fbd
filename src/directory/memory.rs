use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::model::{Job, JobStatus, SearchParams};
use crate::utils::error::SearchError;

use super::JobDirectory;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Default)]
pub struct InMemoryJobDirectory {
    jobs: Mutex<HashMap<String, Job>>,
}

impl InMemoryJobDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: impl IntoIterator<Item = Job>) -> Self {
        let directory = Self::new();
        for job in jobs {
            directory.upsert(job);
        }
        directory
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs().get(job_id).cloned()
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<String, Job>> {
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl JobDirectory for InMemoryJobDirectory {
    /// Open jobs matching every given filter.
    ///
    /// With a centre point, results are ordered nearest first and `radius`
    /// (km) bounds the distance; jobs without coordinates are then left out.
    /// Without a centre, newest first.
    fn search(&self, params: &SearchParams) -> Result<Vec<Job>, SearchError> {
        let centre = validate(params)?;

        let jobs = self.jobs();
        let mut hits: Vec<(Option<f64>, &Job)> = jobs
            .values()
            .filter(|job| job.is_open())
            .filter(|job| {
                params
                    .category
                    .as_deref()
                    .is_none_or(|c| job.category == c)
            })
            .filter(|job| {
                params
                    .job_type
                    .as_deref()
                    .is_none_or(|t| job.job_type.as_deref() == Some(t))
            })
            .filter_map(|job| match centre {
                None => Some((None, job)),
                Some((lat, lng)) => {
                    let distance = distance_km(lat, lng, job.lat?, job.lng?);
                    match params.radius {
                        Some(radius) if distance > radius => None,
                        _ => Some((Some(distance), job)),
                    }
                }
            })
            .collect();

        hits.sort_by(|(da, a), (db, b)| match (da, db) {
            (Some(da), Some(db)) => da
                .partial_cmp(db)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id)),
            _ => b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)),
        });

        Ok(hits.into_iter().map(|(_, job)| job.clone()).collect())
    }

    fn upsert(&self, job: Job) {
        self.jobs().insert(job.id.clone(), job);
    }

    fn remove(&self, job_id: &str) {
        self.jobs().remove(job_id);
    }

    fn expire(&self, job_id: &str) {
        if let Some(job) = self.jobs().get_mut(job_id) {
            job.status = JobStatus::Closed;
        }
    }
}

fn validate(params: &SearchParams) -> Result<Option<(f64, f64)>, SearchError> {
    if let Some(radius) = params.radius {
        if !radius.is_finite() || radius < 0.0 {
            return Err(SearchError::InvalidRadius);
        }
    }

    match (params.lat, params.lng) {
        (Some(lat), Some(lng)) => {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                return Err(SearchError::InvalidCoordinates);
            }
            Ok(Some((lat, lng)))
        }
        (None, None) if params.radius.is_some() => Err(SearchError::MissingCentre),
        (None, None) => Ok(None),
        _ => Err(SearchError::InvalidCoordinates),
    }
}

/// Great-circle distance using the haversine formula.
pub(crate) fn distance_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}
