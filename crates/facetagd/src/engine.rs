use facetag_core::seed::seed_persons;
use facetag_core::{
    lookup_provider, BlendedMatcher, DatabaseError, DatabaseStats, DetectedFace, DetectionRequest,
    DetectorError, DownloadError, DownloadHistory, DownloadRecord, FaceDatabase,
    FaceDetectionResult, FaceDetector, NewPerson, Person, PersonUpdate, ProviderError,
    RecognitionResult,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Accuracy range assigned to a successful simulated training run.
const TRAINED_ACCURACY_MIN: f32 = 0.85;
const TRAINED_ACCURACY_MAX: f32 = 0.99;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error("face index {index} out of range ({total} faces detected)")]
    FaceIndexOutOfRange { index: usize, total: usize },
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

impl EngineError {
    /// Errors caused by the caller's input rather than the daemon.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            EngineError::Detector(_)
                | EngineError::Provider(_)
                | EngineError::FaceIndexOutOfRange { .. }
                | EngineError::Database(
                    DatabaseError::EmptyName
                        | DatabaseError::SelfMerge(_)
                        | DatabaseError::PersonNotFound(_)
                        | DatabaseError::FaceNotFound { .. }
                )
                | EngineError::Download(DownloadError::Invalid(_))
        )
    }
}

/// Startup parameters for the engine thread.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub data_dir: PathBuf,
    pub default_provider: String,
    pub latency_scale: f32,
    pub seed_demo_data: bool,
    pub rng_seed: Option<u64>,
}

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Detect {
        request: DetectionRequest,
        provider: String,
        reply: Reply<FaceDetectionResult>,
    },
    Recognize {
        request: DetectionRequest,
        provider: String,
        min_confidence: f32,
        reply: Reply<RecognitionResult>,
    },
    AddPerson {
        person: NewPerson,
        reply: Reply<Person>,
    },
    UpdatePerson {
        id: String,
        update: PersonUpdate,
        reply: Reply<Person>,
    },
    GetPerson {
        id: String,
        reply: Reply<Person>,
    },
    ListPersons {
        reply: Reply<Vec<Person>>,
    },
    SearchPersons {
        query: String,
        reply: Reply<Vec<Person>>,
    },
    ConfirmFace {
        person_id: String,
        request: DetectionRequest,
        provider: String,
        face_index: usize,
        reply: Reply<DetectedFace>,
    },
    RemoveFace {
        person_id: String,
        face_id: String,
        reply: Reply<DetectedFace>,
    },
    MergePersons {
        target_id: String,
        source_id: String,
        reply: Reply<Person>,
    },
    DeletePerson {
        id: String,
        reply: Reply<Person>,
    },
    /// Replies with the run number the timer must present to finish it.
    StartTraining {
        id: String,
        reply: Reply<u64>,
    },
    /// Sent by the training timer; no reply.
    FinishTraining { id: String, run: u64 },
    Stats {
        reply: Reply<DatabaseStats>,
    },
    RecordDownload {
        record: DownloadRecord,
        reply: Reply<()>,
    },
    ListDownloads {
        user_id: String,
        reply: Reply<Vec<DownloadRecord>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Detect faces; detection failures yield an empty result.
    pub async fn detect(
        &self,
        request: DetectionRequest,
        provider: String,
    ) -> Result<FaceDetectionResult, EngineError> {
        self.call(|reply| EngineRequest::Detect { request, provider, reply })
            .await
    }

    /// Detect faces and match each against the person database.
    pub async fn recognize(
        &self,
        request: DetectionRequest,
        provider: String,
        min_confidence: f32,
    ) -> Result<RecognitionResult, EngineError> {
        self.call(|reply| EngineRequest::Recognize {
            request,
            provider,
            min_confidence,
            reply,
        })
        .await
    }

    pub async fn add_person(&self, person: NewPerson) -> Result<Person, EngineError> {
        self.call(|reply| EngineRequest::AddPerson { person, reply }).await
    }

    pub async fn update_person(&self, id: String, update: PersonUpdate) -> Result<Person, EngineError> {
        self.call(|reply| EngineRequest::UpdatePerson { id, update, reply })
            .await
    }

    pub async fn get_person(&self, id: String) -> Result<Person, EngineError> {
        self.call(|reply| EngineRequest::GetPerson { id, reply }).await
    }

    pub async fn list_persons(&self) -> Result<Vec<Person>, EngineError> {
        self.call(|reply| EngineRequest::ListPersons { reply }).await
    }

    pub async fn search_persons(&self, query: String) -> Result<Vec<Person>, EngineError> {
        self.call(|reply| EngineRequest::SearchPersons { query, reply })
            .await
    }

    /// Detect faces in an image and attach the `face_index`-th one to a person.
    pub async fn confirm_face(
        &self,
        person_id: String,
        request: DetectionRequest,
        provider: String,
        face_index: usize,
    ) -> Result<DetectedFace, EngineError> {
        self.call(|reply| EngineRequest::ConfirmFace {
            person_id,
            request,
            provider,
            face_index,
            reply,
        })
        .await
    }

    pub async fn remove_face(&self, person_id: String, face_id: String) -> Result<DetectedFace, EngineError> {
        self.call(|reply| EngineRequest::RemoveFace {
            person_id,
            face_id,
            reply,
        })
        .await
    }

    pub async fn merge_persons(&self, target_id: String, source_id: String) -> Result<Person, EngineError> {
        self.call(|reply| EngineRequest::MergePersons {
            target_id,
            source_id,
            reply,
        })
        .await
    }

    pub async fn delete_person(&self, id: String) -> Result<Person, EngineError> {
        self.call(|reply| EngineRequest::DeletePerson { id, reply }).await
    }

    /// Start a simulated training run that finishes after `delay`.
    ///
    /// Returns once the person is in `training`; completion is delivered to
    /// the engine by a timer task. Only the latest run of a person can be
    /// finished by its timer.
    pub async fn train(&self, id: String, delay: Duration) -> Result<(), EngineError> {
        let person_id = id.clone();
        let run = self
            .call(|reply| EngineRequest::StartTraining { id, reply })
            .await?;

        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx
                .send(EngineRequest::FinishTraining { id: person_id, run })
                .await
                .is_err()
            {
                tracing::warn!("engine gone before training finished");
            }
        });
        Ok(())
    }

    pub async fn stats(&self) -> Result<DatabaseStats, EngineError> {
        self.call(|reply| EngineRequest::Stats { reply }).await
    }

    pub async fn record_download(&self, record: DownloadRecord) -> Result<(), EngineError> {
        self.call(|reply| EngineRequest::RecordDownload { record, reply })
            .await
    }

    pub async fn list_downloads(&self, user_id: String) -> Result<Vec<DownloadRecord>, EngineError> {
        self.call(|reply| EngineRequest::ListDownloads { user_id, reply })
            .await
    }
}

/// State owned by the engine thread.
struct Engine {
    detector: FaceDetector,
    database: FaceDatabase,
    downloads: DownloadHistory,
    rng: StdRng,
    default_provider: String,
    /// Latest training run per person id.
    training_runs: HashMap<String, u64>,
    next_run: u64,
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads the download history and seeds the database synchronously, so a
/// bad data directory or provider name fails at startup.
pub fn spawn_engine(settings: EngineSettings) -> Result<EngineHandle, EngineError> {
    let default_profile = lookup_provider(&settings.default_provider)?;
    let downloads = DownloadHistory::load(&settings.data_dir)?;
    tracing::info!(
        path = %DownloadHistory::path_in(&settings.data_dir).display(),
        records = downloads.len(),
        "download history loaded"
    );

    let mut rng = match settings.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let database = if settings.seed_demo_data {
        let persons = seed_persons(&mut rng, default_profile);
        tracing::info!(count = persons.len(), "demo persons seeded");
        FaceDatabase::with_persons(persons)
    } else {
        FaceDatabase::new()
    };

    let mut engine = Engine {
        detector: FaceDetector::new(settings.latency_scale),
        database,
        downloads,
        rng,
        default_provider: default_profile.name.clone(),
        training_runs: HashMap::new(),
        next_run: 0,
    };

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("facetag-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                engine.handle(req);
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

impl Engine {
    fn handle(&mut self, req: EngineRequest) {
        match req {
            EngineRequest::Detect { request, provider, reply } => {
                let _ = reply.send(self.detect(&request, &provider));
            }
            EngineRequest::Recognize {
                request,
                provider,
                min_confidence,
                reply,
            } => {
                let _ = reply.send(self.recognize(&request, &provider, min_confidence));
            }
            EngineRequest::AddPerson { person, reply } => {
                let _ = reply.send(self.database.add_person(person).map_err(Into::into));
            }
            EngineRequest::UpdatePerson { id, update, reply } => {
                let _ = reply.send(self.database.update_person(&id, update).map_err(Into::into));
            }
            EngineRequest::GetPerson { id, reply } => {
                let result = self
                    .database
                    .get_person(&id)
                    .cloned()
                    .ok_or(EngineError::Database(DatabaseError::PersonNotFound(id)));
                let _ = reply.send(result);
            }
            EngineRequest::ListPersons { reply } => {
                let _ = reply.send(Ok(self.database.persons().to_vec()));
            }
            EngineRequest::SearchPersons { query, reply } => {
                let found = self.database.search_persons(&query).into_iter().cloned().collect();
                let _ = reply.send(Ok(found));
            }
            EngineRequest::ConfirmFace {
                person_id,
                request,
                provider,
                face_index,
                reply,
            } => {
                let _ = reply.send(self.confirm_face(&person_id, &request, &provider, face_index));
            }
            EngineRequest::RemoveFace {
                person_id,
                face_id,
                reply,
            } => {
                let result = self.database.remove_face(&person_id, &face_id);
                let _ = reply.send(result.map_err(Into::into));
            }
            EngineRequest::MergePersons {
                target_id,
                source_id,
                reply,
            } => {
                let result = self.database.merge_persons(&target_id, &source_id);
                let _ = reply.send(result.map_err(Into::into));
            }
            EngineRequest::DeletePerson { id, reply } => {
                let _ = reply.send(self.database.delete_person(&id).map_err(Into::into));
            }
            EngineRequest::StartTraining { id, reply } => {
                let _ = reply.send(self.start_training(&id));
            }
            EngineRequest::FinishTraining { id, run } => self.finish_training(&id, run),
            EngineRequest::Stats { reply } => {
                let _ = reply.send(Ok(self.database.stats()));
            }
            EngineRequest::RecordDownload { record, reply } => {
                let _ = reply.send(self.downloads.record(record).map_err(Into::into));
            }
            EngineRequest::ListDownloads { user_id, reply } => {
                let records = self.downloads.for_user(&user_id).into_iter().cloned().collect();
                let _ = reply.send(Ok(records));
            }
        }
    }

    fn provider_name<'a>(&'a self, provider: &'a str) -> &'a str {
        if provider.is_empty() {
            &self.default_provider
        } else {
            provider
        }
    }

    fn detect(&self, request: &DetectionRequest, provider: &str) -> Result<FaceDetectionResult, EngineError> {
        let profile = lookup_provider(self.provider_name(provider))?;
        Ok(self.detector.detect_or_empty(request, profile))
    }

    fn recognize(
        &self,
        request: &DetectionRequest,
        provider: &str,
        min_confidence: f32,
    ) -> Result<RecognitionResult, EngineError> {
        let profile = lookup_provider(self.provider_name(provider))?;
        let detection = self.detector.detect_or_empty(request, profile);
        let matcher = BlendedMatcher::new(profile.similarity_bonus);
        Ok(self.database.recognize(detection, min_confidence, &matcher))
    }

    fn confirm_face(
        &mut self,
        person_id: &str,
        request: &DetectionRequest,
        provider: &str,
        face_index: usize,
    ) -> Result<DetectedFace, EngineError> {
        if self.database.get_person(person_id).is_none() {
            return Err(DatabaseError::PersonNotFound(person_id.to_string()).into());
        }
        let profile = lookup_provider(self.provider_name(provider))?;
        let mut detection = self.detector.detect(request, profile)?;

        let total = detection.faces.len();
        if face_index >= total {
            return Err(EngineError::FaceIndexOutOfRange {
                index: face_index,
                total,
            });
        }
        let face = detection.faces.swap_remove(face_index);
        self.database.add_face(person_id, face.clone())?;
        Ok(face)
    }

    fn start_training(&mut self, id: &str) -> Result<u64, EngineError> {
        self.database.start_training(id)?;
        self.next_run += 1;
        self.training_runs.insert(id.to_string(), self.next_run);
        tracing::debug!(person_id = id, run = self.next_run, "training run scheduled");
        Ok(self.next_run)
    }

    /// Complete (or fail) training run `run` of a person.
    ///
    /// Timers of superseded runs are ignored. Persons whose faces mix
    /// embedding sizes cannot be trained and fail.
    fn finish_training(&mut self, id: &str, run: u64) {
        if self.training_runs.get(id) != Some(&run) {
            tracing::debug!(person_id = id, run, "superseded training run dropped");
            return;
        }
        self.training_runs.remove(id);

        let uniform = match self.database.get_person(id) {
            Some(person) => person.has_uniform_embeddings(),
            None => {
                tracing::debug!(person_id = id, "training finished for deleted person");
                return;
            }
        };

        let result = if uniform {
            let accuracy = self.rng.gen_range(TRAINED_ACCURACY_MIN..TRAINED_ACCURACY_MAX);
            self.database.complete_training(id, accuracy)
        } else {
            self.database.fail_training(id)
        };

        if let Err(e) = result {
            tracing::debug!(person_id = id, error = %e, "stale training completion dropped");
        }
    }
}
