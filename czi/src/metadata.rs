use anyhow::{bail, Context, Result};
use regex::Regex;
use std::collections::HashMap;

/// Distances are stored in metres.
const METRES_TO_MICRONS: f64 = 1e6;

/// Voxel spacing in microns per axis id, read from the
/// `ImageDocument/Metadata/Scaling/Items/Distance` entries of the XML.
pub fn parse_scaling(xml: &str) -> Result<HashMap<String, f64>> {
    let section = Regex::new(r"(?s)<Scaling>(.*?)</Scaling>")?;
    let Some(scaling) = section.captures(xml).and_then(|c| c.get(1)) else {
        bail!("the metadata has no Scaling section");
    };
    let distance = Regex::new(r#"(?s)<Distance\s+Id="([^"]+)"\s*>(.*?)</Distance>"#)?;
    let value = Regex::new(r"(?s)<Value>\s*([^<]*?)\s*</Value>")?;

    let mut axes = HashMap::new();
    for entry in distance.captures_iter(scaling.as_str()) {
        let axis = &entry[1];
        let Some(raw) = value.captures(&entry[2]).map(|c| c[1].to_string()) else {
            continue;
        };
        let metres: f64 = raw
            .parse()
            .with_context(|| format!("invalid distance {raw:?} for axis {axis}"))?;
        axes.insert(axis.to_string(), metres * METRES_TO_MICRONS);
    }
    Ok(axes)
}
