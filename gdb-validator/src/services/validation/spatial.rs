//! Spatial coincidence with the registered title boundary

use crate::api::BoundaryService;
use crate::config::BoundaryConfig;
use crate::geometry::{MultiPolygon, area_identical};
use crate::services::comparison::{Category, ValidationMessage};
use crate::workspace::{CandidateInventory, Workspace};

const CATEGORY: Category = Category::SpatialMatching;

/// Compare the candidate boundary layer with the service boundary of
/// `case_code`
///
/// Always yields exactly one message. Failures to read either side become a
/// fail message naming the cause.
pub async fn check_spatial(
    workspace: &dyn Workspace,
    inventory: &CandidateInventory,
    boundary: &dyn BoundaryService,
    config: &BoundaryConfig,
    case_code: &str,
) -> ValidationMessage {
    let Some(layer) = inventory.feature_class(&config.layer) else {
        log::warn!("Boundary layer {} not found in candidate", config.layer);
        return ValidationMessage::fail(
            CATEGORY,
            format!("Boundary layer {} not found in candidate", config.layer),
        );
    };

    let local = match workspace.polygons(layer).await {
        Ok(polygons) => polygons,
        Err(e) => {
            log::error!("Failed to read boundary layer {}: {:#}", layer.name, e);
            return ValidationMessage::fail(
                CATEGORY,
                format!("Failed to read boundary layer {}: {:#}", layer.name, e),
            );
        }
    };
    if local.iter().all(MultiPolygon::is_empty) {
        log::warn!("Boundary layer {} holds no polygons", layer.name);
        return ValidationMessage::fail(CATEGORY, format!("Boundary layer {} holds no polygons", layer.name));
    }

    let remote = match boundary.fetch_boundary(case_code, layer.srs_code).await {
        Ok(polygons) => polygons,
        Err(e) => {
            log::error!("Boundary service query for case {} failed: {:#}", case_code, e);
            return ValidationMessage::fail(
                CATEGORY,
                format!("Boundary service query for case {} failed: {:#}", case_code, e),
            );
        }
    };
    if remote.is_empty() {
        log::warn!("Boundary service has no boundary for case {}", case_code);
        return ValidationMessage::fail(
            CATEGORY,
            format!("Boundary service has no boundary for case {}", case_code),
        );
    }

    let matches = count_matches(&local, &remote, config.xy_tolerance);
    log::info!(
        "Boundary comparison for case {}: {} local feature(s), {} remote feature(s), {} match(es)",
        case_code,
        local.len(),
        remote.len(),
        matches
    );

    if matches > 0 {
        ValidationMessage::pass(
            CATEGORY,
            format!(
                "Boundary polygon of {} matches the registered boundary of case {} ({} matching feature(s))",
                layer.name, case_code, matches
            ),
        )
    } else {
        ValidationMessage::fail(
            CATEGORY,
            format!(
                "Boundary polygon of {} does not match the registered boundary of case {}",
                layer.name, case_code
            ),
        )
    }
}

/// Local features area-identical to some remote feature
///
/// When no single feature matches, the layer as a whole is compared with the
/// service result as a whole, so a boundary split differently into features
/// on each side still counts as one match.
fn count_matches(local: &[MultiPolygon], remote: &[MultiPolygon], tolerance: f64) -> usize {
    let pairwise = local
        .iter()
        .filter(|l| remote.iter().any(|r| area_identical(l, r, tolerance)))
        .count();
    if pairwise > 0 {
        return pairwise;
    }

    let merge = |features: &[MultiPolygon]| {
        MultiPolygon(features.iter().flat_map(|f| f.0.iter().cloned()).collect())
    };
    usize::from(area_identical(&merge(local), &merge(remote), tolerance))
}
