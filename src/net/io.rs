//! I/O 支持：JSON、RON 序列化接口与按名称描述弧的网文档格式。
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::net::core::Net;
use crate::net::structure::{ArcKind, Place, Transition, Weight};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ron error: {0}")]
    Ron(#[from] ron::Error),
    #[error("ron syntax error: {0}")]
    RonSpanned(#[from] ron::error::SpannedError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transition `{transition}` refers to unknown place `{place}`")]
    UnknownPlace { transition: String, place: String },
    #[error("duplicate place name `{0}`")]
    DuplicatePlace(String),
}

pub fn to_json_string<T>(value: &T) -> Result<String, IoError>
where
    T: Serialize,
{
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn from_json_str<T>(s: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    Ok(serde_json::from_str(s)?)
}

pub fn write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<(), IoError> {
    let mut file = File::create(path)?;
    file.write_all(to_json_string(value)?.as_bytes())?;
    Ok(())
}

pub fn read_json<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T, IoError> {
    from_json_str(&read_to_string(path)?)
}

pub fn to_ron_string<T>(value: &T) -> Result<String, IoError>
where
    T: Serialize,
{
    let mut pretty = PrettyConfig::default();
    pretty.new_line = "\n".into();
    Ok(ron::ser::to_string_pretty(value, pretty)?)
}

pub fn from_ron_str<T>(s: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    Ok(ron::from_str(s)?)
}

pub fn write_ron<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<(), IoError> {
    let mut file = File::create(path)?;
    file.write_all(to_ron_string(value)?.as_bytes())?;
    Ok(())
}

pub fn read_ron<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T, IoError> {
    from_ron_str(&read_to_string(path)?)
}

fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String, IoError> {
    let mut file = File::open(path)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(content)
}

/// 面向用户的网描述：弧按库所名称书写。
///
/// ```json
/// {
///   "places": [{ "name": "p0", "tokens": 1 }, { "name": "p1" }],
///   "transitions": [
///     { "name": "t0", "inputs": [["p0", 1]], "outputs": [["p1", 1]] }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetDocument {
    pub places: Vec<PlaceDocument>,
    pub transitions: Vec<TransitionDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaceDocument {
    pub name: String,
    #[serde(default)]
    pub tokens: Weight,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionDocument {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<(String, Weight)>,
    #[serde(default)]
    pub outputs: Vec<(String, Weight)>,
    /// `(place, threshold)`：仅当 `M[place] < threshold` 时可发生。
    #[serde(default)]
    pub inhibitors: Vec<(String, Weight)>,
}

impl NetDocument {
    pub fn into_net(self) -> Result<Net, IoError> {
        let mut net = Net::empty();
        for place in self.places {
            if net.place_by_name(&place.name).is_some() {
                return Err(IoError::DuplicatePlace(place.name));
            }
            net.add_place(Place::new(place.name, place.tokens));
        }
        for transition in self.transitions {
            let id = net.add_transition(Transition::new(transition.name.clone()));
            let arcs = transition
                .inputs
                .iter()
                .map(|arc| (arc, ArcKind::Input))
                .chain(transition.outputs.iter().map(|arc| (arc, ArcKind::Output)))
                .chain(
                    transition
                        .inhibitors
                        .iter()
                        .map(|arc| (arc, ArcKind::Inhibitor)),
                );
            for ((name, weight), kind) in arcs {
                let place = net.place_by_name(name).ok_or_else(|| IoError::UnknownPlace {
                    transition: transition.name.clone(),
                    place: name.clone(),
                })?;
                match kind {
                    ArcKind::Input => net.add_input_arc(place, id, *weight),
                    ArcKind::Output => net.add_output_arc(place, id, *weight),
                    ArcKind::Inhibitor => net.set_inhibitor_arc(place, id, *weight),
                }
            }
        }
        Ok(net)
    }
}

#[cfg(test)]
impl NetDocument {
    pub fn from_net(net: &Net) -> Self {
        let places = net
            .places
            .iter()
            .map(|place| PlaceDocument {
                name: place.name.clone(),
                tokens: place.tokens,
            })
            .collect();
        let mut transitions = net
            .transitions
            .iter()
            .map(|transition| TransitionDocument {
                name: transition.name.clone(),
                inputs: Vec::new(),
                outputs: Vec::new(),
                inhibitors: Vec::new(),
            })
            .collect::<Vec<_>>();
        for arc in net.arcs() {
            let entry = (net.places[arc.place].name.clone(), arc.weight);
            let doc = &mut transitions[arc.transition.raw() as usize];
            match arc.kind {
                ArcKind::Input => doc.inputs.push(entry),
                ArcKind::Output => doc.outputs.push(entry),
                ArcKind::Inhibitor => doc.inhibitors.push(entry),
            }
        }
        Self {
            places,
            transitions,
        }
    }
}

/// 按扩展名写出：`.ron` 走 RON，其余按 JSON 处理。
pub fn write_by_extension<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<(), IoError> {
    let path = path.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("ron") => write_ron(path, value),
        _ => write_json(path, value),
    }
}

/// 按扩展名读取网文档：`.ron` 走 RON，其余按 JSON 处理。
pub fn load_net<P: AsRef<Path>>(path: P) -> Result<Net, IoError> {
    let path = path.as_ref();
    let document: NetDocument = match path.extension().and_then(|ext| ext.to_str()) {
        Some("ron") => read_ron(path)?,
        _ => read_json(path)?,
    };
    document.into_net()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ids::{PlaceId, TransitionId};
    use crate::net::structure::Marking;

    const MUTEX: &str = r#"{
        "places": [
            { "name": "idle", "tokens": 2 },
            { "name": "busy" },
            { "name": "lock", "tokens": 1 }
        ],
        "transitions": [
            { "name": "enter", "inputs": [["idle", 1], ["lock", 1]], "outputs": [["busy", 1]] },
            { "name": "leave", "inputs": [["busy", 1]], "outputs": [["idle", 1], ["lock", 1]] },
            { "name": "panic", "inhibitors": [["busy", 1]], "outputs": [["busy", 1]] }
        ]
    }"#;

    #[test]
    fn json_document_builds_net() {
        let document: NetDocument = from_json_str(MUTEX).unwrap();
        let net = document.into_net().unwrap();
        assert_eq!(net.places_len(), 3);
        assert_eq!(net.transitions_len(), 3);
        assert_eq!(net.initial_marking(), Marking::from(vec![2, 0, 1]));
        assert!(net.is_inhibitor_arc(PlaceId(1), TransitionId(2)));
        assert_eq!(net.transition_by_name("leave"), Some(TransitionId(1)));
    }

    #[test]
    fn document_survives_ron() {
        let net = from_json_str::<NetDocument>(MUTEX)
            .unwrap()
            .into_net()
            .unwrap();
        let document = NetDocument::from_net(&net);
        let text = to_ron_string(&document).unwrap();
        let back: NetDocument = from_ron_str(&text).unwrap();
        assert_eq!(back, document);
        assert_eq!(back.transitions[2].inhibitors, vec![("busy".to_string(), 1)]);
    }

    #[test]
    fn extension_selects_format() {
        let net = from_json_str::<NetDocument>(MUTEX)
            .unwrap()
            .into_net()
            .unwrap();
        let dir = std::env::temp_dir().join("pn-stubborn-io-test");
        std::fs::create_dir_all(&dir).unwrap();
        let document = NetDocument::from_net(&net);
        for name in ["mutex.ron", "mutex.json"] {
            let path = dir.join(name);
            write_by_extension(&path, &document).unwrap();
            assert_eq!(load_net(&path).unwrap().initial_marking(), net.initial_marking());
            std::fs::remove_file(&path).unwrap();
        }
        let ron_text = to_ron_string(&document).unwrap();
        assert!(from_json_str::<NetDocument>(&ron_text).is_err());
    }

    #[test]
    fn unknown_place_is_reported() {
        let document = NetDocument {
            places: vec![],
            transitions: vec![TransitionDocument {
                name: "t".into(),
                inputs: vec![("ghost".into(), 1)],
                outputs: vec![],
                inhibitors: vec![],
            }],
        };
        let err = document.into_net().unwrap_err();
        assert!(matches!(err, IoError::UnknownPlace { .. }));
    }
}
