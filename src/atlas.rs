//! World boundary atlas and graticule.
//!
//! Decodes the world-110m TopoJSON (quantized, delta-encoded arcs shared
//! between neighbouring countries) into per-country rings of geographic
//! points, and builds the latitude/longitude grid drawn under them.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::orbit::GeoPoint;

pub const COUNTRIES_OBJECT: &str = "countries";
pub const ATLAS_CACHE_FILE: &str = "world-110m.json";
const GRATICULE_PRECISION_DEG: f64 = 2.5;

#[derive(Deserialize, Debug, Clone, Copy)]
struct Transform {
    scale: [f64; 2],
    translate: [f64; 2],
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum Geometry {
    GeometryCollection {
        geometries: Vec<Geometry>,
    },
    Polygon {
        arcs: Vec<Vec<i64>>,
        #[serde(default)]
        id: Option<serde_json::Value>,
    },
    MultiPolygon {
        arcs: Vec<Vec<Vec<i64>>>,
        #[serde(default)]
        id: Option<serde_json::Value>,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Deserialize, Debug)]
pub struct Topology {
    #[serde(default)]
    transform: Option<Transform>,
    objects: HashMap<String, Geometry>,
    arcs: Vec<Vec<Vec<f64>>>,
}

#[derive(Clone, Debug)]
pub struct Country {
    pub id: String,
    pub rings: Vec<Vec<GeoPoint>>,
}

pub struct Atlas {
    pub countries: Vec<Country>,
}

pub enum AtlasLoadState {
    NotLoaded,
    Loading,
    Loaded(Arc<Atlas>),
    Failed(String),
}

fn id_string(id: &Option<serde_json::Value>) -> String {
    match id {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

impl Topology {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Absolute coordinates of every arc, with the quantization transform
    /// applied when present.
    fn decoded_arcs(&self) -> Result<Vec<Vec<GeoPoint>>> {
        self.arcs
            .iter()
            .enumerate()
            .map(|(i, arc)| {
                let mut x = 0.0;
                let mut y = 0.0;
                arc.iter()
                    .map(|position| {
                        let (px, py) = match position.as_slice() {
                            [px, py, ..] => (*px, *py),
                            _ => return Err(Error::Topology(format!("arc {} has a short position", i))),
                        };
                        Ok(match self.transform {
                            Some(t) => {
                                x += px;
                                y += py;
                                GeoPoint::new(y * t.scale[1] + t.translate[1], x * t.scale[0] + t.translate[0])
                            }
                            None => GeoPoint::new(py, px),
                        })
                    })
                    .collect()
            })
            .collect()
    }

    /// Countries of a named object. Geometries other than polygons are
    /// skipped.
    pub fn features(&self, object: &str) -> Result<Vec<Country>> {
        let root = self
            .objects
            .get(object)
            .ok_or_else(|| Error::Topology(format!("missing object {:?}", object)))?;
        let arcs = self.decoded_arcs()?;
        let mut countries = Vec::new();
        collect_countries(root, &arcs, &mut countries)?;
        Ok(countries)
    }
}

fn collect_countries(geometry: &Geometry, arcs: &[Vec<GeoPoint>], out: &mut Vec<Country>) -> Result<()> {
    match geometry {
        Geometry::GeometryCollection { geometries } => {
            for g in geometries {
                collect_countries(g, arcs, out)?;
            }
        }
        Geometry::Polygon { arcs: rings, id } => {
            out.push(Country {
                id: id_string(id),
                rings: rings.iter().map(|r| stitch_ring(r, arcs)).collect::<Result<_>>()?,
            });
        }
        Geometry::MultiPolygon { arcs: polygons, id } => {
            out.push(Country {
                id: id_string(id),
                rings: polygons
                    .iter()
                    .flatten()
                    .map(|r| stitch_ring(r, arcs))
                    .collect::<Result<_>>()?,
            });
        }
        Geometry::Unsupported => {}
    }
    Ok(())
}

/// Joins arcs end to start. A negative index `!i` walks arc `i` backwards;
/// the shared endpoint between consecutive arcs is kept once.
fn stitch_ring(indices: &[i64], arcs: &[Vec<GeoPoint>]) -> Result<Vec<GeoPoint>> {
    let mut ring: Vec<GeoPoint> = Vec::new();
    for &index in indices {
        let (arc_idx, reversed) = if index < 0 { (!index, true) } else { (index, false) };
        let arc = usize::try_from(arc_idx)
            .ok()
            .and_then(|i| arcs.get(i))
            .ok_or_else(|| Error::Topology(format!("arc index {} out of range", index)))?;
        ring.pop();
        if reversed {
            ring.extend(arc.iter().rev().copied());
        } else {
            ring.extend(arc.iter().copied());
        }
    }
    Ok(ring)
}

/// Meridians every `step` degrees (full pole-to-pole at multiples of 90,
/// otherwise between ±80) and parallels every `step` degrees between ±80.
pub fn graticule(step: f64) -> Vec<Vec<GeoPoint>> {
    let mut lines = Vec::new();
    let samples = |from: f64, to: f64| -> Vec<f64> {
        let n = ((to - from) / GRATICULE_PRECISION_DEG).ceil().max(1.0) as usize;
        (0..=n).map(|i| from + (to - from) * i as f64 / n as f64).collect()
    };

    let meridians = (360.0 / step).round() as usize;
    for i in 0..meridians {
        let lng = -180.0 + i as f64 * step;
        let extent = if (lng % 90.0).abs() < 1e-9 { 90.0 } else { 80.0 };
        lines.push(samples(-extent, extent).into_iter().map(|lat| GeoPoint::new(lat, lng)).collect());
    }

    let parallels = (160.0 / step).floor() as usize;
    for i in 0..=parallels {
        let lat = -80.0 + i as f64 * step;
        lines.push(samples(-180.0, 180.0).into_iter().map(|lng| GeoPoint::new(lat, lng)).collect());
    }
    lines
}

#[cfg(not(target_arch = "wasm32"))]
pub fn load_atlas(url: &str) -> Result<Atlas> {
    let json = crate::fetch::fetch_or_cache(ATLAS_CACHE_FILE, url)?;
    let countries = Topology::from_json(&json)?.features(COUNTRIES_OBJECT)?;
    log::info!("Loaded {} country outlines", countries.len());
    Ok(Atlas { countries })
}

#[cfg(target_arch = "wasm32")]
thread_local! {
    pub(crate) static ATLAS_FETCH_RESULT: std::cell::RefCell<Option<Result<Atlas>>> = const { std::cell::RefCell::new(None) };
}

#[cfg(target_arch = "wasm32")]
pub(crate) async fn load_atlas_async(url: &str) -> Result<Atlas> {
    let json = crate::fetch::fetch_text(url).await?;
    let countries = Topology::from_json(&json)?.features(COUNTRIES_OBJECT)?;
    log::info!("Loaded {} country outlines", countries.len());
    Ok(Atlas { countries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SQUARES: &str = r#"{
        "type": "Topology",
        "transform": { "scale": [0.5, 0.5], "translate": [-10, -10] },
        "objects": {
            "countries": {
                "type": "GeometryCollection",
                "geometries": [
                    { "type": "Polygon", "id": 4, "arcs": [[0, 1]] },
                    { "type": "MultiPolygon", "id": "XK", "arcs": [[[-2, -1]]] },
                    { "type": "Point", "coordinates": [0, 0] }
                ]
            }
        },
        "arcs": [
            [[0, 0], [2, 0], [0, 2]],
            [[2, 2], [-2, 0], [0, -2]]
        ]
    }"#;

    #[test]
    fn decodes_delta_encoded_rings() {
        let countries = Topology::from_json(SQUARES).unwrap().features(COUNTRIES_OBJECT).unwrap();
        assert_eq!(countries.len(), 2);

        let first = &countries[0];
        assert_eq!(first.id, "4");
        let ring = &first.rings[0];
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.first(), ring.last());
        assert_relative_eq!(ring[1].lng, -9.0);
        assert_relative_eq!(ring[1].lat, -10.0);
        assert_relative_eq!(ring[2].lng, -9.0);
        assert_relative_eq!(ring[2].lat, -9.0);
    }

    #[test]
    fn negative_indices_reverse_arcs() {
        let countries = Topology::from_json(SQUARES).unwrap().features(COUNTRIES_OBJECT).unwrap();
        let second = &countries[1];
        assert_eq!(second.id, "XK");
        let ring = &second.rings[0];
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.first(), ring.last());
        // Reversed arc 1 starts at its last point, (-10, -10).
        assert_relative_eq!(ring[0].lng, -10.0);
        assert_relative_eq!(ring[1].lng, -10.0);
        assert_relative_eq!(ring[1].lat, -9.0);
    }

    #[test]
    fn untransformed_topology_uses_raw_coordinates() {
        let json = r#"{ "type": "Topology", "objects": { "land": { "type": "Polygon", "arcs": [[0]] } },
                        "arcs": [[[10, 20], [11, 20], [11, 21], [10, 20]]] }"#;
        let land = Topology::from_json(json).unwrap().features("land").unwrap();
        assert_eq!(land[0].rings[0][2], GeoPoint::new(21.0, 11.0));
    }

    #[test]
    fn bad_references_are_errors() {
        let topo = Topology::from_json(SQUARES).unwrap();
        assert!(matches!(topo.features("land"), Err(Error::Topology(_))));

        let json = SQUARES.replace("[[0, 1]]", "[[0, 7]]");
        let topo = Topology::from_json(&json).unwrap();
        assert!(matches!(topo.features(COUNTRIES_OBJECT), Err(Error::Topology(_))));
    }

    #[test]
    fn graticule_lines() {
        let lines = graticule(10.0);
        // 36 meridians plus parallels at -80..=80.
        assert_eq!(lines.len(), 36 + 17);
        let greenwich = lines.iter().find(|l| l[0].lng == 0.0 && l[0].lat == -90.0).unwrap();
        assert_eq!(greenwich.last().unwrap().lat, 90.0);
        let minor = lines.iter().find(|l| l[0].lng == 10.0).unwrap();
        assert_eq!(minor[0].lat, -80.0);
        assert!(minor.windows(2).all(|w| w[1].lat - w[0].lat <= 2.5 + 1e-9));
        let equator = lines.iter().find(|l| l[0].lat == 0.0 && l[0].lng == -180.0).unwrap();
        assert_eq!(equator.last().unwrap().lng, 180.0);
    }
}
