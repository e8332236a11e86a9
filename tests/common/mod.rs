use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use mekanai::modules::backend::SettingsBackend;
use mekanai::modules::console::Interaction;
use mekanai::modules::errors::ConsoleError;
use mekanai::modules::types::{ListResponse, MutationResponse, Record, SdStatus};
use serde_json::{json, Value};

/// In-memory backend that behaves like the settings API and remembers every
/// request it was sent.
#[derive(Default)]
pub struct RecordingBackend {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    requests: Mutex<Vec<String>>,
    bodies: Mutex<Vec<Record>>,
    offline: Mutex<HashSet<String>>,
    next_id: Mutex<i64>,
    image_backend_down: Mutex<bool>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(100),
            ..Self::default()
        }
    }

    pub fn seed(self, entity: &str, rows: Vec<Value>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| serde_json::from_value(row).unwrap())
            .collect();
        self.tables.lock().unwrap().insert(entity.to_string(), rows);
        self
    }

    /// Makes every request touching `entity` fail at the transport level.
    pub fn take_offline(&self, entity: &str) {
        self.offline.lock().unwrap().insert(entity.to_string());
    }

    /// The image backend answers, but reports itself unreachable.
    pub fn disconnect_image_backend(&self) {
        *self.image_backend_down.lock().unwrap() = true;
    }

    pub fn bring_online(&self, entity: &str) {
        self.offline.lock().unwrap().remove(entity);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, request: &str) -> usize {
        self.requests().iter().filter(|r| *r == request).count()
    }

    pub fn last_body(&self) -> Option<Record> {
        self.bodies.lock().unwrap().last().cloned()
    }

    fn log(&self, entity: &str, request: String) -> Result<(), ConsoleError> {
        self.requests.lock().unwrap().push(request);
        if self.offline.lock().unwrap().contains(entity) {
            return Err(ConsoleError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        Ok(())
    }

    fn check_name(body: &Record) -> Option<MutationResponse> {
        match body.get("name").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => None,
            _ => Some(MutationResponse::error("name is required")),
        }
    }
}

impl SettingsBackend for RecordingBackend {
    fn list(&self, entity: &str) -> Result<ListResponse, ConsoleError> {
        self.log(entity, format!("GET /api/settings/{entity}"))?;
        let tables = self.tables.lock().unwrap();
        match tables.get(entity) {
            Some(rows) => Ok(ListResponse {
                items: rows.clone(),
                count: Some(rows.len() as u64),
                status: Some("success".to_string()),
                message: None,
            }),
            None => Ok(ListResponse {
                status: Some("error".to_string()),
                message: Some(format!("unknown table: {entity}")),
                ..ListResponse::default()
            }),
        }
    }

    fn create(&self, entity: &str, body: &Record) -> Result<MutationResponse, ConsoleError> {
        self.log(entity, format!("POST /api/settings/{entity}"))?;
        self.bodies.lock().unwrap().push(body.clone());
        if let Some(rejection) = Self::check_name(body) {
            return Ok(rejection);
        }
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let row = body.clone().with("id", *next_id);
        self.tables
            .lock()
            .unwrap()
            .entry(entity.to_string())
            .or_default()
            .push(row);
        Ok(MutationResponse::success())
    }

    fn update(&self, entity: &str, id: i64, body: &Record) -> Result<MutationResponse, ConsoleError> {
        self.log(entity, format!("PUT /api/settings/{entity}/{id}"))?;
        self.bodies.lock().unwrap().push(body.clone());
        if let Some(rejection) = Self::check_name(body) {
            return Ok(rejection);
        }
        let mut tables = self.tables.lock().unwrap();
        let Some(row) = tables
            .get_mut(entity)
            .and_then(|rows| rows.iter_mut().find(|r| r.id() == Some(id)))
        else {
            return Ok(MutationResponse::error("record not found"));
        };
        *row = body.clone().with("id", id);
        Ok(MutationResponse::success())
    }

    fn delete(&self, entity: &str, id: i64) -> Result<MutationResponse, ConsoleError> {
        self.log(entity, format!("DELETE /api/settings/{entity}/{id}"))?;
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(entity.to_string()).or_default();
        let before = rows.len();
        rows.retain(|r| r.id() != Some(id));
        if rows.len() == before {
            return Ok(MutationResponse::error("record not found"));
        }
        Ok(MutationResponse::success())
    }

    fn sd_status(&self) -> Result<SdStatus, ConsoleError> {
        self.log("sd-status", "GET /api/sd-status".to_string())?;
        if *self.image_backend_down.lock().unwrap() {
            return Ok(SdStatus {
                connected: false,
                models: Vec::new(),
            });
        }
        Ok(SdStatus {
            connected: true,
            models: vec!["sdxl_base".to_string(), "realvis_v4".to_string()],
        })
    }

    fn post_json(&self, endpoint: &str, body: &Value) -> Result<Value, ConsoleError> {
        self.log(endpoint, format!("POST {endpoint}"))?;
        Ok(json!({"status": "success", "echo": body}))
    }
}

/// Scripted answers to prompts, with every alert kept.
#[derive(Default)]
pub struct ScriptedUi {
    pub answer: bool,
    pub confirms: usize,
    pub alerts: Vec<String>,
}

impl ScriptedUi {
    pub fn agreeing() -> Self {
        Self {
            answer: true,
            ..Self::default()
        }
    }

    pub fn refusing() -> Self {
        Self::default()
    }
}

impl Interaction for ScriptedUi {
    fn confirm(&mut self, _message: &str) -> bool {
        self.confirms += 1;
        self.answer
    }

    fn alert(&mut self, message: &str) {
        self.alerts.push(message.to_string());
    }
}

pub fn seeded() -> RecordingBackend {
    RecordingBackend::new()
        .seed("styles", vec![json!({"id": 1, "name": "Scandinavian", "category": "interior", "sort_order": 0})])
        .seed("scenes", vec![])
        .seed("perspectives", vec![json!({"id": 1, "name": "Eye level"})])
        .seed("lightings", vec![json!({"id": 1, "name": "Golden hour"})])
        .seed("ratios", vec![json!({"id": 1, "name": "Square", "width": 1, "height": 1, "sort_order": 0})])
        .seed(
            "ai_providers",
            vec![
                json!({"id": 1, "name": "Local SD", "key": "local_sd", "type": "local", "enabled": true}),
                json!({"id": 2, "name": "OpenAI", "key": "openai", "type": "cloud", "enabled": false}),
            ],
        )
        .seed(
            "ai_models",
            vec![json!({
                "id": 5, "name": "SDXL", "key": "sdxl", "type": "checkpoint", "enabled": true,
                "provider_id": 1, "provider": {"id": 1, "name": "Local SD"}
            })],
        )
        .seed("modes", vec![json!({"id": 1, "name": "Sketch", "key": "sketch", "controlnet_weight": 0.8})])
}
