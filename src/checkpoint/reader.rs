//! Checkpoint file readers
//!
//! - `.pth` / `.ckpt`: PyTorch zip archives. Non-tensor entries are decoded
//!   from `data.pkl`, tensors under the `weight` key are read with candle.
//! - `.safetensors`: tensors from the payload, non-tensor entries from the
//!   `__metadata__` header (`config` and `params` as JSON strings).

use candle_core::pickle::{Object, PthTensors, Stack};
use candle_core::{Device, Tensor};
use safetensors::SafeTensors;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

use super::adapter::CheckpointParams;
use super::record::{CheckpointMetadata, CheckpointRecord, WeightMap};
use crate::core::error::{Result, ResultExt, VcError};

/// Top-level key holding the network weights in PyTorch checkpoints
const WEIGHT_KEY: &str = "weight";

/// Read a checkpoint, dispatching on the file extension
pub fn read_checkpoint(path: &Path) -> Result<CheckpointRecord> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let record = match ext.as_str() {
        "pth" | "ckpt" => read_pytorch(path),
        "safetensors" => read_safetensors(path),
        _ => Err(VcError::ModelLoad {
            message: format!("unsupported checkpoint extension '{}'", ext),
            component: "checkpoint".to_string(),
            path: None,
        }),
    }
    .map_err(|e| e.with_path(path))?;

    info!(
        "Read checkpoint {:?}: {} tensors, {} config entries",
        path,
        record.weights.len(),
        record.config.len()
    );
    Ok(record)
}

fn load_error(message: impl Into<String>) -> VcError {
    VcError::ModelLoad {
        message: message.into(),
        component: "checkpoint".to_string(),
        path: None,
    }
}

fn read_pytorch(path: &Path) -> Result<CheckpointRecord> {
    let root = read_pickle_root(path)?;
    let entries = match root {
        Object::Dict(entries) => entries,
        other => {
            return Err(VcError::corrupt(format!(
                "checkpoint root is not a dict: {:?}",
                std::mem::discriminant(&other)
            )))
        }
    };

    let mut fields: HashMap<String, Object> = HashMap::new();
    for (key, value) in entries {
        if let Object::Unicode(key) = key {
            fields.insert(key, value);
        }
    }

    let config = match fields.get("config").and_then(object_to_json) {
        Some(Value::Array(values)) => values,
        Some(_) => return Err(VcError::corrupt("'config' is not a list")),
        None => return Err(VcError::corrupt("checkpoint has no 'config' entry")),
    };

    let params = match fields.get("params").and_then(object_to_json) {
        Some(Value::Object(map)) => Some(CheckpointParams::from_map(map)),
        _ => None,
    };

    let mut metadata = CheckpointMetadata::default();
    if let Some(f0) = fields.get("f0").and_then(object_to_json).and_then(|v| v.as_i64()) {
        metadata.f0 = f0;
    }
    if let Some(Value::String(name)) = fields.get("embedder_name").and_then(object_to_json) {
        metadata.embedder_name = name;
    }
    metadata.version = fields.get("version").and_then(object_to_string);
    metadata.info = fields.get("info").and_then(object_to_string);
    metadata.sample_rate_tag = fields.get("sr").and_then(object_to_string);

    let tensors = PthTensors::new(path, Some(WEIGHT_KEY))
        .map_err(|e| load_error(format!("failed to index weight tensors: {}", e)))?;
    let mut weights = WeightMap::new();
    let names: Vec<String> = tensors.tensor_infos().keys().cloned().collect();
    for name in names {
        if let Some(tensor) = tensors.get(&name)? {
            weights.insert(name, tensor);
        }
    }
    debug!("Decoded {} weight tensors from {:?}", weights.len(), path);

    let mut record = CheckpointRecord::new(weights, config, metadata);
    record.params = params;
    Ok(record)
}

/// Decode the pickled object graph of a PyTorch zip archive
fn read_pickle_root(path: &Path) -> Result<Object> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| load_error(format!("not a PyTorch zip archive: {}", e)))?;

    let pickle_name = archive
        .file_names()
        .find(|name| name.ends_with("data.pkl"))
        .map(str::to_string)
        .ok_or_else(|| load_error("archive has no data.pkl"))?;

    let entry = archive
        .by_name(&pickle_name)
        .map_err(|e| load_error(format!("cannot open {}: {}", pickle_name, e)))?;
    let mut reader = BufReader::new(entry);
    let mut stack = Stack::empty();
    stack.read_loop(&mut reader)?;
    Ok(stack.finalize()?)
}

/// Plain pickle values as JSON; tensors and classes have no JSON form
fn object_to_json(obj: &Object) -> Option<Value> {
    match obj {
        Object::Int(v) => Some(Value::from(*v)),
        Object::Float(v) => serde_json::Number::from_f64(*v).map(Value::Number),
        Object::Unicode(v) => Some(Value::String(v.clone())),
        Object::Bool(v) => Some(Value::Bool(*v)),
        Object::None => Some(Value::Null),
        Object::List(items) | Object::Tuple(items) => items
            .iter()
            .map(object_to_json)
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        Object::Dict(entries) => {
            let mut map = Map::new();
            for (key, value) in entries {
                let Object::Unicode(key) = key else {
                    return None;
                };
                map.insert(key.clone(), object_to_json(value)?);
            }
            Some(Value::Object(map))
        }
        _ => None,
    }
}

fn object_to_string(obj: &Object) -> Option<String> {
    match object_to_json(obj)? {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn read_safetensors(path: &Path) -> Result<CheckpointRecord> {
    let data = std::fs::read(path)?;
    let (_, header) = SafeTensors::read_metadata(&data)
        .map_err(|e| load_error(format!("invalid safetensors header: {}", e)))?;
    let meta = header.metadata().clone().unwrap_or_default();

    let config: Vec<Value> = match meta.get("config") {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| VcError::corrupt(format!("'config' is not a JSON list: {}", e)))?,
        None => return Err(VcError::corrupt("checkpoint has no 'config' entry")),
    };

    let params = match meta.get("params") {
        Some(raw) => match serde_json::from_str::<Value>(raw)
            .map_err(|e| VcError::corrupt(format!("'params' is not JSON: {}", e)))?
        {
            Value::Object(map) => Some(CheckpointParams::from_map(map)),
            _ => None,
        },
        None => None,
    };

    let mut metadata = CheckpointMetadata::default();
    if let Some(f0) = meta.get("f0") {
        metadata.f0 = f0
            .trim()
            .parse()
            .map_err(|_| VcError::corrupt(format!("'f0' is not an integer: {}", f0)))?;
    }
    if let Some(name) = meta.get("embedder_name") {
        metadata.embedder_name = name.clone();
    }
    metadata.version = meta.get("version").cloned();
    metadata.info = meta.get("info").cloned();
    metadata.sample_rate_tag = meta.get("sr").cloned();

    let tensors = candle_core::safetensors::load_buffer(&data, &Device::Cpu)?;

    let mut record = CheckpointRecord::new(WeightMap::from(tensors), config, metadata);
    record.params = params;
    Ok(record)
}

/// Write a checkpoint in the safetensors layout read by [`read_checkpoint`]
pub fn save_safetensors(record: &CheckpointRecord, path: &Path) -> Result<()> {
    let mut meta = HashMap::new();
    meta.insert(
        "config".to_string(),
        serde_json::to_string(&record.config).context("cannot serialize config")?,
    );
    if let Some(params) = &record.params {
        meta.insert(
            "params".to_string(),
            serde_json::to_string(params).context("cannot serialize params")?,
        );
    }
    meta.insert("f0".to_string(), record.metadata.f0.to_string());
    meta.insert(
        "embedder_name".to_string(),
        record.metadata.embedder_name.clone(),
    );
    if let Some(version) = &record.metadata.version {
        meta.insert("version".to_string(), version.clone());
    }
    if let Some(info) = &record.metadata.info {
        meta.insert("info".to_string(), info.clone());
    }
    if let Some(sr) = &record.metadata.sample_rate_tag {
        meta.insert("sr".to_string(), sr.clone());
    }

    // safetensors wants contiguous CPU buffers
    let mut tensors: Vec<(String, Tensor)> = Vec::with_capacity(record.weights.len());
    for (name, tensor) in record.weights.iter() {
        tensors.push((name.clone(), tensor.to_device(&Device::Cpu)?.contiguous()?));
    }

    safetensors::serialize_to_file(tensors, &Some(meta), path).map_err(|e| VcError::Io {
        message: format!("failed to write safetensors: {}", e),
        path: Some(path.to_path_buf()),
    })?;
    info!("Wrote checkpoint {:?}", path);
    Ok(())
}
