//! Family grouping: partition candidates into radius families.
//!
//! Injection-molded parts repeat a handful of stake designs, so the
//! cylinders of real stakes cluster tightly around a few radii. Grouping
//! by rounded radius separates those design standards from one-off
//! geometry; buckets too small to be a standard are measurement noise
//! (chamfers and fillets misread as cylinders).

use std::collections::HashMap;

use log::{debug, info};

use crate::core::features::CylinderFeature;

/// Radius above which a family is more likely a locator/waydoor than a
/// heat stake. Only used for triage logging.
const LOCATOR_RADIUS_HINT: f64 = 3.5;
/// Radius below which a family is likely pin debris. Logging only.
const PIN_RADIUS_HINT: f64 = 1.0;

/// Bucket key: radius rounded to one decimal place, scaled to an
/// integer so it can key a map exactly.
#[inline]
fn radius_key(radius: f64) -> i64 {
    (radius * 10.0).round() as i64
}

/// Partition candidates into radius families.
///
/// Buckets candidates by radius rounded to one decimal, discards buckets
/// with fewer than `min_family_size` members, and labels the survivors
/// `GRP1, GRP2, ...` by descending population. The largest population is
/// assumed to be the dominant, most reliable design standard; radius
/// value plays no part in label priority. Equal populations are ordered
/// by ascending radius so labelling is canonical.
///
/// An empty input yields an empty list.
///
/// # Returns
///
/// `(label, members)` pairs in label order.
pub fn group_by_families(
    candidates: &[CylinderFeature],
    min_family_size: usize,
) -> Vec<(String, Vec<CylinderFeature>)> {
    let mut buckets: HashMap<i64, Vec<CylinderFeature>> = HashMap::new();
    for cand in candidates {
        buckets.entry(radius_key(cand.radius)).or_default().push(*cand);
    }

    // Rank by descending population, then ascending radius for a
    // canonical order among equal populations.
    let mut keys: Vec<i64> = buckets.keys().copied().collect();
    keys.sort_unstable_by_key(|k| (std::cmp::Reverse(buckets[k].len()), *k));

    let mut families = Vec::new();
    for key in keys {
        let members = &buckets[&key];
        let radius = key as f64 / 10.0;

        if members.len() < min_family_size {
            debug!(
                "discarded noise bucket: radius ~{radius:.1}mm, {} members",
                members.len()
            );
            continue;
        }

        let label = format!("GRP{}", families.len() + 1);
        let typical_fins = median_planes(members);
        info!(
            "family {label}: {} members, radius ~{radius:.1}mm, typical fins {typical_fins}",
            members.len()
        );

        if radius > LOCATOR_RADIUS_HINT {
            debug!("family {label}: large radius, possible waydoor/locator");
        } else if radius < PIN_RADIUS_HINT {
            debug!("family {label}: very small radius, possible pin debris");
        }

        families.push((label, members.clone()));
    }

    families
}

/// Median connected-plane count of a bucket, truncated to an integer.
fn median_planes(members: &[CylinderFeature]) -> u32 {
    let mut planes: Vec<u32> = members.iter().map(|c| c.connected_planes).collect();
    planes.sort_unstable();

    let n = planes.len();
    if n == 0 {
        0
    } else if n % 2 == 1 {
        planes[n / 2]
    } else {
        (planes[n / 2 - 1] + planes[n / 2]) / 2
    }
}
