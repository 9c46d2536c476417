//! ASAP XML annotation files.
//!
//! The format written by the ASAP viewer (and shipped with Camelyon16):
//!
//! ```text
//! <ASAP_Annotations>
//!   <Annotations>
//!     <Annotation Name="_0" Type="Polygon" PartOfGroup="Tumor" Color="#F4FA58">
//!       <Coordinates>
//!         <Coordinate Order="0" X="1234.5" Y="6789.0" />
//!         ...
//!       </Coordinates>
//!     </Annotation>
//!   </Annotations>
//!   <AnnotationGroups>...</AnnotationGroups>
//! </ASAP_Annotations>
//! ```
//!
//! Each annotation's `PartOfGroup` is mapped to a class label by a caller
//! supplied table.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::AnnotationError;

use super::render::Annotation;

#[derive(Debug, Deserialize)]
struct AsapDocument {
    #[serde(rename = "Annotations", default)]
    annotations: AsapAnnotations,
}

#[derive(Debug, Default, Deserialize)]
struct AsapAnnotations {
    #[serde(rename = "Annotation", default)]
    items: Vec<AsapAnnotation>,
}

#[derive(Debug, Deserialize)]
struct AsapAnnotation {
    #[serde(rename = "@Name", default)]
    name: String,
    #[serde(rename = "@Type")]
    kind: String,
    #[serde(rename = "@PartOfGroup")]
    group: String,
    #[serde(rename = "Coordinates", default)]
    coordinates: AsapCoordinates,
}

#[derive(Debug, Default, Deserialize)]
struct AsapCoordinates {
    #[serde(rename = "Coordinate", default)]
    items: Vec<AsapCoordinate>,
}

#[derive(Debug, Deserialize)]
struct AsapCoordinate {
    #[serde(rename = "@Order", default)]
    order: Option<u32>,
    #[serde(rename = "@X")]
    x: f64,
    #[serde(rename = "@Y")]
    y: f64,
}

/// Parse ASAP XML text, mapping groups to labels through `groups`.
pub fn parse_asap(
    xml: &str,
    groups: &BTreeMap<String, String>,
    source: &str,
) -> Result<Vec<Annotation>, AnnotationError> {
    let document: AsapDocument =
        quick_xml::de::from_str(xml).map_err(|e| AnnotationError::Malformed {
            path: source.to_string(),
            message: e.to_string(),
        })?;

    document
        .annotations
        .items
        .into_iter()
        .map(|item| {
            let label = groups
                .get(&item.group)
                .ok_or_else(|| AnnotationError::UnknownGroup(item.group.clone()))?;
            let kind = item.kind.parse()?;

            let mut coordinates = item.coordinates.items;
            coordinates.sort_by_key(|c| c.order);
            let vertices = coordinates.into_iter().map(|c| (c.x, c.y)).collect();

            Ok(Annotation::new(item.name, kind, label.clone(), vertices))
        })
        .collect()
}

/// Load annotations from an ASAP XML file.
///
/// A path that is not a regular file (missing, empty, a directory) yields no
/// annotations rather than an error.
pub fn load_asap(
    path: &Path,
    groups: &BTreeMap<String, String>,
) -> Result<Vec<Annotation>, AnnotationError> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let xml = std::fs::read_to_string(path).map_err(|e| AnnotationError::io(path, e))?;
    parse_asap(&xml, groups, &path.display().to_string())
}
