use std::cell::RefCell;
use std::rc::Rc;
use std::sync::LazyLock;

use chrono::Utc;
use language_utils::{CategoryId, ContentPack, ItemId, Language};
use stash::{BrowserTimeout, KeyValueStore, ListenerKey, LocalStorage};
use wasm_bindgen::prelude::*;

use crate::audio::HtmlAudioPlayer;
use crate::config::{DrillConfig, DrillMode, Settings};
use crate::migration::MigrationOutcome;
use crate::orchestrator::SessionOrchestrator;
use crate::progress::ProgressStore;
use crate::session::SessionView;
use crate::tracker::{AnswerOutcome, SessionSummary};

type SharedStore = Rc<dyn KeyValueStore>;

// putting this inside LOGGER prevents us from accidentally initializing the logger more than once
#[allow(clippy::declare_interior_mutable_const)]
const LOGGER: LazyLock<()> = LazyLock::new(|| {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    wasm_logger::init(wasm_logger::Config::default());
    log::info!("Logging initialized");
});

#[wasm_bindgen]
pub struct Lugha {
    // never hold a borrow across an .await, so callbacks that re-enter can't hit "already borrowed"
    orchestrator: RefCell<SessionOrchestrator<SharedStore>>,
}

fn to_js(value: &impl serde::Serialize) -> Result<JsValue, JsError> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsError::new(&e.to_string()))
}

#[wasm_bindgen]
impl Lugha {
    /// `settings` is optional JSON; missing fields keep their defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(settings: Option<String>) -> Result<Lugha, JsError> {
        #[allow(clippy::borrow_interior_mutable_const)]
        *LOGGER;

        let settings: Settings = match settings {
            Some(json) => serde_json::from_str(&json)
                .inspect_err(|e| log::error!("Invalid settings: {e}"))?,
            None => Settings::default(),
        };
        let store: SharedStore = Rc::new(
            LocalStorage::new().inspect_err(|e| log::error!("No localStorage: {e}"))?,
        );
        let progress = ProgressStore::new(store)
            .with_settings(settings)
            .with_pause(BrowserTimeout);

        let mut orchestrator = SessionOrchestrator::new(progress);
        orchestrator.set_audio_player(HtmlAudioPlayer);
        Ok(Self {
            orchestrator: RefCell::new(orchestrator),
        })
    }

    pub fn add_content_pack(&self, json: &str) -> Result<(), JsError> {
        let pack = ContentPack::from_json(json)
            .inspect_err(|e| log::error!("Rejected content pack: {e}"))?;
        self.orchestrator
            .borrow_mut()
            .add_content_pack(pack)
            .inspect_err(|e| log::error!("Rejected content pack: {e}"))?;
        Ok(())
    }

    pub fn set_config(&self, config: DrillConfig) {
        self.orchestrator.borrow_mut().set_config(config);
    }

    /// The callback receives every `ProgressEvent` as a plain object. Returns
    /// a handle for `unsubscribe`.
    pub fn subscribe(&self, callback: js_sys::Function) -> u64 {
        let key = self.orchestrator.borrow_mut().subscribe(move |event| {
            match serde_wasm_bindgen::to_value(event) {
                Ok(event) => {
                    if let Err(e) = callback.call1(&JsValue::null(), &event) {
                        log::error!("Progress listener threw: {e:?}");
                    }
                }
                Err(e) => log::error!("Could not convert {event:?}: {e}"),
            }
        });
        key.to_ffi()
    }

    pub fn unsubscribe(&self, key: u64) {
        self.orchestrator
            .borrow_mut()
            .unsubscribe(ListenerKey::from_ffi(key));
    }

    pub fn start_lesson(
        &self,
        mode: DrillMode,
        language: Language,
        category: String,
        subcategory: Option<String>,
    ) -> Result<SessionView, JsError> {
        let _flusher = FlushLater::new(self);
        let now = Utc::now();
        let mut orchestrator = self.orchestrator.borrow_mut();
        let session = orchestrator.start_lesson(
            mode,
            language,
            &CategoryId::new(category),
            subcategory.as_deref(),
            now,
        )?;
        Ok(session.view(now))
    }

    pub fn start_difficult_words(&self, language: Language) -> Result<SessionView, JsError> {
        let _flusher = FlushLater::new(self);
        let now = Utc::now();
        let mut orchestrator = self.orchestrator.borrow_mut();
        Ok(orchestrator.start_difficult_words(language, now)?.view(now))
    }

    pub fn has_pending_resume(&self, language: Language, category: String) -> bool {
        self.orchestrator
            .borrow()
            .pending_resume(language, &CategoryId::new(category), Utc::now())
            .is_some()
    }

    pub fn resume_lesson(
        &self,
        language: Language,
        category: String,
    ) -> Result<SessionView, JsError> {
        let _flusher = FlushLater::new(self);
        let now = Utc::now();
        let mut orchestrator = self.orchestrator.borrow_mut();
        Ok(orchestrator
            .resume_lesson(language, &CategoryId::new(category), now)?
            .view(now))
    }

    pub fn view(&self) -> Option<SessionView> {
        self.orchestrator.borrow().view(Utc::now())
    }

    pub fn advance_preview(&self) -> Result<bool, JsError> {
        let _flusher = FlushLater::new(self);
        Ok(self.orchestrator.borrow_mut().advance_preview(Utc::now())?)
    }

    pub fn begin_test(&self) -> Result<SessionView, JsError> {
        let _flusher = FlushLater::new(self);
        let now = Utc::now();
        let mut orchestrator = self.orchestrator.borrow_mut();
        Ok(orchestrator.begin_test(now)?.view(now))
    }

    pub fn submit_answer(&self, item: String, answer: String) -> Result<AnswerOutcome, JsError> {
        let _flusher = FlushLater::new(self);
        Ok(self.orchestrator.borrow_mut().submit_answer(
            &ItemId::from_surface(&item),
            &answer,
            Utc::now(),
        )?)
    }

    pub fn expire_question(&self) -> Result<AnswerOutcome, JsError> {
        let _flusher = FlushLater::new(self);
        Ok(self.orchestrator.borrow_mut().expire_question(Utc::now())?)
    }

    pub fn play_audio(&self) -> bool {
        self.orchestrator.borrow().play_audio()
    }

    pub fn abandon(&self) -> Result<(), JsError> {
        let _flusher = FlushLater::new(self);
        Ok(self.orchestrator.borrow_mut().abandon()?)
    }

    /// Saves the finished session once; later calls resolve to `undefined`.
    pub async fn complete_session(&self) -> Result<Option<SessionSummary>, JsError> {
        let Some(report) = SessionOrchestrator::complete_session(&self.orchestrator).await else {
            return Ok(None);
        };
        report.outcome?;
        Ok(Some(report.summary))
    }

    pub async fn migrate(&self, language: Language) -> Result<MigrationOutcome, JsError> {
        Ok(SessionOrchestrator::migrate(&self.orchestrator, language).await?)
    }

    pub fn category_progress(&self, language: Language, category: String) -> Result<JsValue, JsError> {
        let progress = self.orchestrator.borrow().category_progress(
            language,
            &CategoryId::new(category),
            Utc::now(),
        )?;
        to_js(&progress)
    }

    pub fn course_progress(&self, language: Language) -> Result<JsValue, JsError> {
        let progress = self
            .orchestrator
            .borrow()
            .course_progress(language, Utc::now())?;
        to_js(&progress)
    }

    pub fn reset_category(&self, language: Language, category: String) -> Result<(), JsError> {
        let _flusher = FlushLater::new(self);
        Ok(self
            .orchestrator
            .borrow_mut()
            .reset_category(language, &CategoryId::new(category))?)
    }

    fn flush_notifications(&self) {
        // drain first and call after the borrow ends: listeners may call back into us
        let notifications = self.orchestrator.borrow_mut().drain_notifications();
        for notification in notifications {
            notification();
        }
    }
}

#[wasm_bindgen]
pub fn available_languages() -> Vec<Language> {
    language_utils::LANGUAGES.to_vec()
}

/// Flushes listeners when dropped, whichever way the function returns.
struct FlushLater<'a> {
    lugha: &'a Lugha,
}

impl<'a> FlushLater<'a> {
    fn new(lugha: &'a Lugha) -> Self {
        Self { lugha }
    }
}

impl Drop for FlushLater<'_> {
    fn drop(&mut self) {
        self.lugha.flush_notifications();
    }
}
