use serde::Serialize;

use crate::{StoreError, TestCase};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Repetitions per case. Each case's `iteration` when unset.
    pub repetitions: Option<u32>,
    pub filter: Option<String>,
    pub fail_fast: bool,
}

impl RunOptions {
    pub fn selects(&self, case: &TestCase) -> bool {
        match &self.filter {
            Some(filter) => case.name.contains(filter.as_str()),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub mean_ms: f64,
    pub median_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p95_ms: f64,
}

impl Summary {
    pub fn from_samples(samples: &[f64]) -> Option<Summary> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let median_ms = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };
        // Nearest rank.
        let rank = ((0.95 * n as f64).ceil() as usize).clamp(1, n);

        Some(Summary {
            mean_ms: sorted.iter().sum::<f64>() / n as f64,
            median_ms,
            min_ms: sorted[0],
            max_ms: sorted[n - 1],
            p95_ms: sorted[rank - 1],
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub name: String,
    pub label: String,
    pub iteration: u32,
    pub samples: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs `case` `repetitions` times and returns one duration per run.
///
/// A failed prep or benchmark still gets its cleanup before the error is returned.
pub async fn run_case(case: &TestCase, repetitions: u32) -> Result<Vec<f64>, StoreError> {
    let mut samples = Vec::with_capacity(repetitions as usize);

    for _ in 0..repetitions {
        if let Some(prep) = &case.prep {
            if let Err(e) = prep().await {
                return Err(cleanup_after_failure(case, e).await);
            }
        }

        let sample = match (case.benchmark)().await {
            Ok(sample) => sample,
            Err(e) => return Err(cleanup_after_failure(case, e).await),
        };

        if let Some(cleanup) = &case.cleanup {
            cleanup().await?;
        }
        samples.push(sample);
    }

    Ok(samples)
}

async fn cleanup_after_failure(case: &TestCase, err: StoreError) -> StoreError {
    if let Some(cleanup) = &case.cleanup {
        if let Err(cleanup_err) = cleanup().await {
            log::warn!(
                "Cleanup after failed `{}` also failed: {cleanup_err}",
                case.name
            );
        }
    }
    err
}

pub async fn run_cases(
    cases: &[TestCase],
    options: &RunOptions,
) -> Result<Vec<CaseReport>, StoreError> {
    let mut reports = Vec::new();

    for case in cases.iter().filter(|case| options.selects(case)) {
        let repetitions = options.repetitions.unwrap_or(case.iteration);
        log::info!("Running {} ({repetitions}x): {}", case.name, case.label);

        let (samples, error) = match run_case(case, repetitions).await {
            Ok(samples) => (samples, None),
            Err(e) if options.fail_fast => return Err(e),
            Err(e) => {
                log::error!("{} failed: {e}", case.name);
                (Vec::new(), Some(e.to_string()))
            }
        };

        let summary = Summary::from_samples(&samples);
        if let Some(summary) = &summary {
            log::debug!("{}: median {:.3}ms", case.name, summary.median_ms);
        }

        reports.push(CaseReport {
            name: case.name.to_string(),
            label: case.label.to_string(),
            iteration: case.iteration,
            samples,
            summary,
            error,
        });
    }

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::cases::idb_read;
    use crate::{Backends, Payload, Suite};

    #[test]
    fn summary() {
        assert_eq!(None, Summary::from_samples(&[]));

        let s = Summary::from_samples(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(2.5, s.mean_ms);
        assert_eq!(2.5, s.median_ms);
        assert_eq!(1.0, s.min_ms);
        assert_eq!(4.0, s.max_ms);
        assert_eq!(4.0, s.p95_ms);

        let samples: Vec<f64> = (1..=100).map(f64::from).collect();
        let s = Summary::from_samples(&samples).unwrap();
        assert_eq!(95.0, s.p95_ms);
        assert_eq!(50.5, s.median_ms);
    }

    fn recording_case(events: &Rc<RefCell<Vec<&'static str>>>, fail: bool) -> TestCase {
        let (e1, e2, e3) = (events.clone(), events.clone(), events.clone());
        TestCase::new("recording", "records phase order", move || {
            e1.borrow_mut().push("benchmark");
            async move {
                if fail {
                    Err(StoreError::new("boom"))
                } else {
                    Ok(1.5)
                }
            }
        })
        .with_prep(move || {
            e2.borrow_mut().push("prep");
            async { Ok::<_, StoreError>(()) }
        })
        .with_cleanup(move || {
            e3.borrow_mut().push("cleanup");
            async { Ok::<_, StoreError>(()) }
        })
    }

    #[tokio::test]
    async fn phases_run_in_order() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let case = recording_case(&events, false);

        assert_eq!(vec![1.5, 1.5], run_case(&case, 2).await.unwrap());
        assert_eq!(
            vec!["prep", "benchmark", "cleanup", "prep", "benchmark", "cleanup"],
            *events.borrow()
        );
    }

    #[tokio::test]
    async fn failed_benchmark_still_cleans_up() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let case = recording_case(&events, true);

        assert_eq!(StoreError::new("boom"), run_case(&case, 3).await.unwrap_err());
        assert_eq!(vec!["prep", "benchmark", "cleanup"], *events.borrow());
    }

    #[tokio::test]
    async fn failed_prep_still_cleans_up() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let e = events.clone();
        let case = recording_case(&events, false).with_prep(move || {
            e.borrow_mut().push("prep");
            async { Err::<(), _>(StoreError::new("prep failed")) }
        });

        assert_eq!(
            StoreError::new("prep failed"),
            run_case(&case, 3).await.unwrap_err()
        );
        assert_eq!(vec!["prep", "cleanup"], *events.borrow());
    }

    #[tokio::test]
    async fn leftover_database_only_fails_the_first_read_case() {
        let backends = Backends::in_memory();
        idb_read::prep(&backends.idb, 1, &Payload::from("stale"))
            .await
            .unwrap();

        let cases = Suite::IdbRead.test_cases(&backends);
        let options = RunOptions {
            repetitions: Some(1),
            ..Default::default()
        };
        let reports = run_cases(&cases, &options).await.unwrap();

        assert!(reports[0].error.is_some());
        assert!(reports[1..].iter().all(|r| r.error.is_none()));
        assert!(backends.idb.database_names().is_empty());
    }

    #[tokio::test]
    async fn failures_are_recorded_unless_fail_fast() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let cases = vec![
            recording_case(&events, true),
            recording_case(&events, false).with_iteration(3),
        ];

        let reports = run_cases(&cases, &RunOptions::default()).await.unwrap();
        assert_eq!(Some("boom".to_string()), reports[0].error);
        assert!(reports[0].summary.is_none());
        assert_eq!(3, reports[1].samples.len());
        assert_eq!(Some(1.5), reports[1].summary.map(|s| s.max_ms));

        let options = RunOptions {
            fail_fast: true,
            ..Default::default()
        };
        assert!(run_cases(&cases, &options).await.is_err());
    }

    #[tokio::test]
    async fn every_suite_runs_against_in_memory_stores() {
        let backends = Backends::in_memory();
        let options = RunOptions {
            repetitions: Some(2),
            ..Default::default()
        };

        for suite in Suite::ALL {
            let cases = suite.test_cases(&backends);
            let reports = run_cases(&cases, &options).await.unwrap();
            assert_eq!(cases.len(), reports.len());
            for report in &reports {
                assert_eq!(None, report.error, "{}", report.name);
                assert_eq!(2, report.samples.len());
                assert!(report.samples.iter().all(|s| *s >= 0.0));
            }
        }

        assert!(backends.idb.database_names().is_empty());
        assert!(backends.local_storage.is_empty().unwrap());
    }

    #[tokio::test]
    async fn filter_selects_by_name() {
        let backends = Backends::in_memory();
        let cases = Suite::IdbRead.test_cases(&backends);
        let options = RunOptions {
            repetitions: Some(1),
            filter: Some("Cursor".into()),
            ..Default::default()
        };

        let names: Vec<_> = run_cases(&cases, &options)
            .await
            .unwrap()
            .into_iter()
            .map(|report| report.name)
            .collect();
        assert_eq!(vec!["idbRead1024x100BCursor", "idbRead100x1KBCursor"], names);
    }
}
