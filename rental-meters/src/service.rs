use std::time::Duration;

use time::OffsetDateTime;

use crate::{
    aggregation::{
        combine_monthly, latest_reading, monthly_consumption, readings_with_consumption,
        CombinedMonth, MonthlyConsumption, PeriodFilter, ReadingWithConsumption,
    },
    domain::{Reading, SeriesTarget, SpaceDocument, UtilityKind},
    error::{ReadingError, StoreError},
    store::{DocumentStore, Precondition, Versioned},
    validation::{validate_against_series, validate_reading_date, validate_value, ValidationError},
};

/// A reading as submitted, before the system stamps it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewReading {
    pub value: f64,
    pub notes: Option<String>,
    pub reading_date: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(25),
        }
    }
}

/// Records readings into space documents and answers consumption queries.
pub struct ReadingService<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: DocumentStore> ReadingService<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validates and appends a reading to the target series.
    ///
    /// The document is written back guarded by the version it was read at.
    /// A concurrent writer makes the guard fail; the document is then
    /// reloaded and the reading revalidated against the fresh series before
    /// trying again.
    pub async fn record_reading(
        &self,
        target: &SeriesTarget,
        new: NewReading,
    ) -> Result<Reading, ReadingError> {
        let value = validate_value(new.value).map_err(|e| rejected(target, e))?;
        if let Some(date) = new.reading_date {
            validate_reading_date(date).map_err(|e| rejected(target, e))?;
        }
        let notes = new
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let mut attempt: u32 = 0;
        loop {
            let Versioned {
                version,
                mut document,
            } = self.store.get_document(&target.space_id).await?;

            let series = document
                .series_mut(target.room_id.as_deref(), target.utility)
                .ok_or_else(|| ReadingError::NotFound(format!("series {target}")))?;
            validate_against_series(series, value).map_err(|e| rejected(target, e))?;

            let now = OffsetDateTime::now_utc();
            let reading = Reading {
                value,
                reading_date: new.reading_date.unwrap_or(now),
                notes: notes.clone(),
                created_at: now,
            };
            series.push(reading.clone());

            match self
                .store
                .put_document(&target.space_id, document, Precondition::Version(version))
                .await
            {
                Ok(saved) => {
                    metrics::counter!("readings_recorded_total").increment(1);
                    tracing::info!(
                        series = %target,
                        value,
                        version = saved.version,
                        "meter reading recorded"
                    );
                    return Ok(reading);
                }
                Err(StoreError::VersionConflict { .. }) if attempt < self.retry.max_retries => {
                    attempt += 1;
                    metrics::counter!("readings_write_conflicts_total").increment(1);
                    tracing::warn!(
                        series = %target,
                        attempt,
                        "space document changed underneath reading, retrying"
                    );
                    tokio::time::sleep(self.retry.backoff * attempt).await;
                }
                Err(StoreError::VersionConflict { .. }) => {
                    metrics::counter!("readings_write_conflicts_total").increment(1);
                    tracing::error!(series = %target, "reading write kept conflicting, giving up");
                    return Err(ReadingError::Conflict {
                        attempts: attempt + 1,
                    });
                }
                Err(e) => {
                    tracing::error!(series = %target, error = %e, "failed to persist reading");
                    return Err(e.into());
                }
            }
        }
    }

    pub async fn latest_reading(
        &self,
        target: &SeriesTarget,
    ) -> Result<Option<Reading>, ReadingError> {
        let (series, _) = self.load_series(target).await?;
        Ok(latest_reading(&series).cloned())
    }

    pub async fn readings_with_consumption(
        &self,
        target: &SeriesTarget,
    ) -> Result<Vec<ReadingWithConsumption>, ReadingError> {
        let (series, unit_price) = self.load_series(target).await?;
        Ok(readings_with_consumption(&series, unit_price))
    }

    pub async fn monthly_consumption(
        &self,
        target: &SeriesTarget,
        filter: &PeriodFilter,
    ) -> Result<Vec<MonthlyConsumption>, ReadingError> {
        let (series, unit_price) = self.load_series(target).await?;
        Ok(monthly_consumption(&series, unit_price, filter))
    }

    /// Electricity and water side by side per month for one billable unit.
    pub async fn monthly_statement(
        &self,
        space_id: &str,
        room_id: Option<&str>,
        filter: &PeriodFilter,
    ) -> Result<Vec<CombinedMonth>, ReadingError> {
        let document = self.store.get_document(space_id).await?.document;
        let readings = document.meter_readings(room_id).ok_or_else(|| {
            ReadingError::NotFound(match room_id {
                Some(room_id) => format!("room {room_id} in space {space_id}"),
                None => format!("apartment meters in space {space_id}"),
            })
        })?;

        let [electricity, water] = UtilityKind::ALL.map(|utility| {
            monthly_consumption(
                readings.series(utility),
                document.prices.price(utility),
                filter,
            )
        });
        Ok(combine_monthly(&electricity, &water))
    }

    async fn load_series(&self, target: &SeriesTarget) -> Result<(Vec<Reading>, f64), ReadingError> {
        let document: SpaceDocument = self.store.get_document(&target.space_id).await?.document;
        let unit_price = document.prices.price(target.utility);
        let series = document
            .series(target.room_id.as_deref(), target.utility)
            .ok_or_else(|| ReadingError::NotFound(format!("series {target}")))?;
        Ok((series.to_vec(), unit_price))
    }
}

fn rejected(target: &SeriesTarget, err: ValidationError) -> ReadingError {
    metrics::counter!("readings_rejected_total").increment(1);
    tracing::debug!(series = %target, error = %err, "meter reading rejected");
    ReadingError::Validation(err)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::{
        aggregation::Consumption,
        domain::{MeterReadings, Room, SpaceLayout, UtilityPrices},
        store::MemoryDocumentStore,
    };
    use time::macros::datetime;

    fn reading(value: f64, at: OffsetDateTime) -> Reading {
        Reading {
            value,
            reading_date: at,
            notes: None,
            created_at: at,
        }
    }

    fn apartment(electricity: Vec<Reading>) -> SpaceDocument {
        SpaceDocument {
            id: "apt-1".to_string(),
            name: "Studio".to_string(),
            address: Some("12 Main St".to_string()),
            prices: UtilityPrices {
                electricity: 2800.0,
                water: 10000.0,
            },
            layout: SpaceLayout::Apartment {
                meter_readings: MeterReadings {
                    electricity,
                    water: Vec::new(),
                },
            },
        }
    }

    fn no_wait() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            backoff: Duration::ZERO,
        }
    }

    async fn service_with(doc: SpaceDocument) -> ReadingService<MemoryDocumentStore> {
        let store = MemoryDocumentStore::new();
        store
            .put_document(&doc.id.clone(), doc, Precondition::Absent)
            .await
            .unwrap();
        ReadingService::new(store, no_wait())
    }

    fn electricity() -> SeriesTarget {
        SeriesTarget::apartment("apt-1", UtilityKind::Electricity)
    }

    #[tokio::test]
    async fn records_reading_and_stamps_dates() {
        let service = service_with(apartment(Vec::new())).await;

        let recorded = service
            .record_reading(
                &electricity(),
                NewReading {
                    value: 100.0,
                    notes: Some("  move-in  ".to_string()),
                    reading_date: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(recorded.notes.as_deref(), Some("move-in"));
        assert_eq!(recorded.reading_date, recorded.created_at);

        let stored = service.store().get_document("apt-1").await.unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(
            stored.document.series(None, UtilityKind::Electricity),
            Some(&[recorded][..])
        );
    }

    #[tokio::test]
    async fn rejects_values_not_above_latest() {
        let service =
            service_with(apartment(vec![reading(120.0, datetime!(2024-03-01 00:00:00 UTC))]))
                .await;

        let submit = |value| NewReading {
            value,
            ..NewReading::default()
        };

        assert_eq!(
            service.record_reading(&electricity(), submit(120.0)).await,
            Err(ReadingError::Validation(ValidationError::AlreadyRecorded {
                value: 120.0
            }))
        );
        assert!(matches!(
            service.record_reading(&electricity(), submit(119.0)).await,
            Err(ReadingError::Validation(ValidationError::NotIncreasing { .. }))
        ));
        assert!(matches!(
            service.record_reading(&electricity(), submit(-3.0)).await,
            Err(ReadingError::Validation(ValidationError::InvalidValue))
        ));

        // Rejections never write.
        assert_eq!(service.store().get_document("apt-1").await.unwrap().version, 1);

        let accepted = service.record_reading(&electricity(), submit(120.5)).await.unwrap();
        assert_eq!(accepted.value, 120.5);
    }

    #[tokio::test]
    async fn unknown_space_or_room_is_not_found() {
        let service = service_with(apartment(Vec::new())).await;

        let missing_space = SeriesTarget::apartment("nope", UtilityKind::Water);
        assert!(matches!(
            service.record_reading(&missing_space, NewReading::default()).await,
            Err(ReadingError::NotFound(_))
        ));

        let room_on_apartment = SeriesTarget::room("apt-1", "r-1", UtilityKind::Water);
        assert!(matches!(
            service.latest_reading(&room_on_apartment).await,
            Err(ReadingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rooms_keep_independent_series() {
        let doc = SpaceDocument {
            id: "bh-1".to_string(),
            name: "Riverside".to_string(),
            address: None,
            prices: UtilityPrices {
                electricity: 3000.0,
                water: 15000.0,
            },
            layout: SpaceLayout::BoardingHouse {
                rooms: vec![
                    Room {
                        id: "r-1".to_string(),
                        name: "101".to_string(),
                        meter_readings: MeterReadings::default(),
                    },
                    Room {
                        id: "r-2".to_string(),
                        name: "102".to_string(),
                        meter_readings: MeterReadings::default(),
                    },
                ],
            },
        };
        let service = service_with(doc).await;

        let room_one = SeriesTarget::room("bh-1", "r-1", UtilityKind::Water);
        let room_two = SeriesTarget::room("bh-1", "r-2", UtilityKind::Water);
        for value in [10.0, 14.0] {
            service
                .record_reading(
                    &room_one,
                    NewReading {
                        value,
                        ..NewReading::default()
                    },
                )
                .await
                .unwrap();
        }
        // Room two starts from scratch, so a low value is fine.
        service
            .record_reading(
                &room_two,
                NewReading {
                    value: 2.0,
                    ..NewReading::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(
            service.latest_reading(&room_one).await.unwrap().map(|r| r.value),
            Some(14.0)
        );
        assert_eq!(
            service.latest_reading(&room_two).await.unwrap().map(|r| r.value),
            Some(2.0)
        );
        let rows = service.readings_with_consumption(&room_one).await.unwrap();
        assert_eq!(
            rows[0].consumption,
            Consumption::Measured {
                amount: 4.0,
                cost: 60000.0
            }
        );
    }

    #[tokio::test]
    async fn queries_use_document_prices() {
        let service = service_with(apartment(vec![
            reading(150.0, datetime!(2024-01-20 00:00:00 UTC)),
            reading(100.0, datetime!(2024-01-01 00:00:00 UTC)),
            reading(170.0, datetime!(2024-02-05 00:00:00 UTC)),
        ]))
        .await;

        let monthly = service
            .monthly_consumption(&electricity(), &PeriodFilter::default())
            .await
            .unwrap();
        assert_eq!(monthly[1].cost, 140000.0);

        let statement = service
            .monthly_statement("apt-1", None, &PeriodFilter::default())
            .await
            .unwrap();
        assert_eq!(statement.len(), 2);
        assert!(statement.iter().all(|m| m.water.is_none()));
        assert_eq!(statement[1].total_cost, 140000.0);

        assert!(matches!(
            service
                .monthly_statement("apt-1", Some("r-1"), &PeriodFilter::default())
                .await,
            Err(ReadingError::NotFound(_))
        ));
    }

    /// Lets another writer slip in a reading between our read and our write.
    struct RacingStore {
        inner: MemoryDocumentStore,
        interleave: AtomicU32,
    }

    #[async_trait::async_trait]
    impl DocumentStore for RacingStore {
        async fn get_document(&self, id: &str) -> Result<Versioned<SpaceDocument>, StoreError> {
            self.inner.get_document(id).await
        }

        async fn put_document(
            &self,
            id: &str,
            document: SpaceDocument,
            precondition: Precondition,
        ) -> Result<Versioned<SpaceDocument>, StoreError> {
            if self.interleave.fetch_add(1, Ordering::SeqCst) == 0 {
                let mut theirs = self.inner.get_document(id).await?.document;
                if let Some(series) = theirs.series_mut(None, UtilityKind::Electricity) {
                    series.push(reading(130.0, datetime!(2024-03-02 00:00:00 UTC)));
                }
                self.inner.put_document(id, theirs, Precondition::Any).await?;
            }
            self.inner.put_document(id, document, precondition).await
        }
    }

    #[tokio::test]
    async fn concurrent_write_is_retried_not_lost() {
        let inner = MemoryDocumentStore::new();
        inner
            .put_document(
                "apt-1",
                apartment(vec![reading(120.0, datetime!(2024-03-01 00:00:00 UTC))]),
                Precondition::Absent,
            )
            .await
            .unwrap();
        let service = ReadingService::new(
            RacingStore {
                inner: inner.clone(),
                interleave: AtomicU32::new(0),
            },
            no_wait(),
        );

        service
            .record_reading(
                &electricity(),
                NewReading {
                    value: 140.0,
                    reading_date: Some(datetime!(2024-03-03 00:00:00 UTC)),
                    ..NewReading::default()
                },
            )
            .await
            .unwrap();

        let stored = inner.get_document("apt-1").await.unwrap();
        let mut values: Vec<f64> = stored
            .document
            .series(None, UtilityKind::Electricity)
            .unwrap()
            .iter()
            .map(|r| r.value)
            .collect();
        values.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(values, vec![120.0, 130.0, 140.0]);
        assert_eq!(stored.version, 3);
    }

    #[tokio::test]
    async fn retry_revalidates_against_the_winning_write() {
        let inner = MemoryDocumentStore::new();
        inner
            .put_document(
                "apt-1",
                apartment(vec![reading(120.0, datetime!(2024-03-01 00:00:00 UTC))]),
                Precondition::Absent,
            )
            .await
            .unwrap();
        let service = ReadingService::new(
            RacingStore {
                inner: inner.clone(),
                interleave: AtomicU32::new(0),
            },
            no_wait(),
        );

        // 125 beats 120 but not the 130 the other writer lands first.
        let result = service
            .record_reading(
                &electricity(),
                NewReading {
                    value: 125.0,
                    ..NewReading::default()
                },
            )
            .await;
        assert!(matches!(
            result,
            Err(ReadingError::Validation(ValidationError::NotIncreasing { .. }))
        ));
    }

    struct AlwaysConflicting(MemoryDocumentStore);

    #[async_trait::async_trait]
    impl DocumentStore for AlwaysConflicting {
        async fn get_document(&self, id: &str) -> Result<Versioned<SpaceDocument>, StoreError> {
            self.0.get_document(id).await
        }

        async fn put_document(
            &self,
            _id: &str,
            _document: SpaceDocument,
            _precondition: Precondition,
        ) -> Result<Versioned<SpaceDocument>, StoreError> {
            Err(StoreError::VersionConflict {
                expected: Some(1),
                actual: Some(2),
            })
        }
    }

    #[tokio::test]
    async fn gives_up_after_bounded_retries() {
        let inner = MemoryDocumentStore::new();
        inner
            .put_document("apt-1", apartment(Vec::new()), Precondition::Absent)
            .await
            .unwrap();
        let service = ReadingService::new(AlwaysConflicting(inner), no_wait());

        let result = service
            .record_reading(
                &electricity(),
                NewReading {
                    value: 1.0,
                    ..NewReading::default()
                },
            )
            .await;
        assert_eq!(result, Err(ReadingError::Conflict { attempts: 4 }));
    }
}
