use crate::model::Bus;
use serde::Serialize;

/// How many buses are offered when nothing serves both stops.
pub const SUGGESTION_COUNT: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Every bus listed serves both stops.
    Direct,
    /// No bus serves both stops; the first buses of the fleet are offered instead.
    Suggested,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteSearch {
    pub kind: MatchKind,
    pub buses: Vec<Bus>,
}

/// Buses whose route contains both stops, in fleet order.
///
/// The position of the two stops along the route is not compared, so a bus that
/// reaches `end_stop_id` before `start_stop_id` still matches.
/// Returns `None` when either id is empty.
pub fn find_routes<'a>(
    buses: impl IntoIterator<Item = &'a Bus> + Clone,
    start_stop_id: &str,
    end_stop_id: &str,
) -> Option<RouteSearch> {
    if start_stop_id.is_empty() || end_stop_id.is_empty() {
        return None;
    }

    let direct: Vec<Bus> = buses
        .clone()
        .into_iter()
        .filter(|b| b.serves(start_stop_id) && b.serves(end_stop_id))
        .cloned()
        .collect();

    if !direct.is_empty() {
        return Some(RouteSearch {
            kind: MatchKind::Direct,
            buses: direct,
        });
    }

    Some(RouteSearch {
        kind: MatchKind::Suggested,
        buses: buses.into_iter().take(SUGGESTION_COUNT).cloned().collect(),
    })
}
