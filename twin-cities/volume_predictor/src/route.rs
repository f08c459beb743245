//! Route choice between Minneapolis and St. Paul along I-94.
//!
//! The network is four waypoints: the two city centers and two intermediate
//! points of a detour. Only two paths exist, the direct edge and the
//! three-edge detour. Selection is either a volume threshold, a shortest path
//! weighted by live delays, or a ranking of TomTom's own alternatives.

use flow_backend::{Coordinate, RouteCandidate};
use geo::{line_string, Haversine, Length, LineString};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub const MINNEAPOLIS: &str = "Minneapolis";
pub const ST_PAUL: &str = "St. Paul";
pub const ALT_ROUTE_1: &str = "Alt Route 1";
pub const ALT_ROUTE_2: &str = "Alt Route 2";

const METERS_PER_MILE: f64 = 1609.344;

/// Edge weight used when a live delay could not be fetched.
pub const UNKNOWN_DELAY_MINUTES: i64 = 9999;

pub const DIRECT_LEGS: [(&str, &str); 1] = [(MINNEAPOLIS, ST_PAUL)];
pub const DETOUR_LEGS: [(&str, &str); 3] = [
    (MINNEAPOLIS, ALT_ROUTE_1),
    (ALT_ROUTE_1, ALT_ROUTE_2),
    (ALT_ROUTE_2, ST_PAUL),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl Waypoint {
    pub fn new(name: &str, lat: f64, lon: f64) -> Self {
        Self {
            name: name.to_string(),
            lat,
            lon,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }
}

pub fn i94_waypoints() -> Vec<Waypoint> {
    vec![
        Waypoint::new(MINNEAPOLIS, 44.9778, -93.2650),
        Waypoint::new(ST_PAUL, 44.9537, -93.0900),
        Waypoint::new(ALT_ROUTE_1, 44.9700, -93.2000),
        Waypoint::new(ALT_ROUTE_2, 44.9600, -93.1500),
    ]
}

/// Great-circle distance in miles.
pub fn distance_miles(a: &Waypoint, b: &Waypoint) -> f64 {
    let line: LineString<f64> = line_string![(x: a.lon, y: a.lat), (x: b.lon, y: b.lat)];
    Haversine.length(&line) / METERS_PER_MILE
}

#[derive(Debug, Clone, PartialEq)]
struct Edge {
    from: usize,
    to: usize,
    weight: f64,
}

/// Small directed graph of named waypoints. Rebuilt for every request.
#[derive(Debug, Clone, Default)]
pub struct RouteGraph {
    nodes: Vec<Waypoint>,
    edges: Vec<Edge>,
}

#[derive(Copy, Clone, PartialEq)]
struct State {
    cost: f64,
    node: usize,
}

impl Eq for State {}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // min-heap on cost
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl RouteGraph {
    pub fn new(nodes: Vec<Waypoint>) -> Self {
        Self {
            nodes,
            edges: Vec::new(),
        }
    }

    pub fn i94() -> Self {
        Self::new(i94_waypoints())
    }

    pub fn nodes(&self) -> &[Waypoint] {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&Waypoint> {
        self.nodes.iter().find(|n| n.name == name)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Adds a directed edge. Returns `false` if either end is unknown.
    pub fn add_edge(&mut self, from: &str, to: &str, weight: f64) -> bool {
        match (self.index_of(from), self.index_of(to)) {
            (Some(from), Some(to)) => {
                self.edges.push(Edge { from, to, weight });
                true
            }
            _ => false,
        }
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Dijkstra over non-negative weights. Returns the waypoint names from
    /// `source` to `target`, or `None` when `target` is unreachable.
    pub fn shortest_path(&self, source: &str, target: &str) -> Option<Vec<String>> {
        let src = self.index_of(source)?;
        let dst = self.index_of(target)?;

        let mut dist = vec![f64::INFINITY; self.nodes.len()];
        let mut prev: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut heap = BinaryHeap::new();
        dist[src] = 0.0;
        heap.push(State { cost: 0.0, node: src });

        while let Some(State { cost, node }) = heap.pop() {
            if node == dst {
                break;
            }
            if cost > dist[node] {
                continue;
            }
            for e in self.edges.iter().filter(|e| e.from == node) {
                let next = cost + e.weight;
                if next < dist[e.to] {
                    dist[e.to] = next;
                    prev[e.to] = Some(node);
                    heap.push(State {
                        cost: next,
                        node: e.to,
                    });
                }
            }
        }

        if dist[dst].is_infinite() {
            return None;
        }
        let mut path = vec![dst];
        let mut cur = dst;
        while let Some(p) = prev[cur] {
            path.push(p);
            cur = p;
        }
        path.reverse();
        Some(path.into_iter().map(|i| self.nodes[i].name.clone()).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteChoice {
    Direct,
    Detour,
}

impl RouteChoice {
    pub fn legs(self) -> &'static [(&'static str, &'static str)] {
        match self {
            RouteChoice::Direct => &DIRECT_LEGS,
            RouteChoice::Detour => &DETOUR_LEGS,
        }
    }
}

/// Below the threshold the direct edge is taken; at or above it, the detour.
pub fn select_by_threshold(volume: i32, threshold: i32) -> RouteChoice {
    if volume < threshold {
        RouteChoice::Direct
    } else {
        RouteChoice::Detour
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CongestionLevel {
    Low,
    Moderate,
    High,
}

impl CongestionLevel {
    pub fn color(self) -> &'static str {
        match self {
            CongestionLevel::Low => "green",
            CongestionLevel::Moderate => "orange",
            CongestionLevel::High => "red",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CongestionTiers {
    pub moderate_from: i32,
    pub high_from: i32,
}

impl Default for CongestionTiers {
    fn default() -> Self {
        Self {
            moderate_from: 1200,
            high_from: 1700,
        }
    }
}

impl CongestionTiers {
    pub fn classify(&self, volume: i32) -> CongestionLevel {
        if volume < self.moderate_from {
            CongestionLevel::Low
        } else if volume < self.high_from {
            CongestionLevel::Moderate
        } else {
            CongestionLevel::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub from: Waypoint,
    pub to: Waypoint,
    pub miles: f64,
    /// Live delay used as the edge weight, when the plan came from live data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_minutes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub choice: RouteChoice,
    pub path: Vec<String>,
    /// Waypoints worth a marker; the direct route hides the detour points.
    pub visible: Vec<Waypoint>,
    pub legs: Vec<RouteLeg>,
    pub total_miles: f64,
}

impl RoutePlan {
    fn from_path(graph: &RouteGraph, path: Vec<String>, delays: &[EdgeDelay]) -> Self {
        let choice = if path.len() == 2 {
            RouteChoice::Direct
        } else {
            RouteChoice::Detour
        };
        let legs: Vec<RouteLeg> = path
            .windows(2)
            .filter_map(|pair| {
                let from = graph.node(&pair[0])?.clone();
                let to = graph.node(&pair[1])?.clone();
                let delay_minutes = delays
                    .iter()
                    .find(|d| d.from == from.name && d.to == to.name)
                    .map(|d| d.weight_minutes());
                Some(RouteLeg {
                    miles: distance_miles(&from, &to),
                    from,
                    to,
                    delay_minutes,
                })
            })
            .collect();
        let visible = path
            .iter()
            .filter_map(|name| graph.node(name).cloned())
            .collect();
        Self {
            choice,
            total_miles: legs.iter().map(|l| l.miles).sum(),
            path,
            visible,
            legs,
        }
    }
}

/// Plan for a predicted volume under the fixed-threshold policy.
pub fn plan_for_volume(volume: i32, threshold: i32) -> RoutePlan {
    let choice = select_by_threshold(volume, threshold);
    let mut graph = RouteGraph::i94();
    for (from, to) in choice.legs() {
        graph.add_edge(from, to, 1.0);
    }
    let mut path = vec![MINNEAPOLIS.to_string()];
    path.extend(choice.legs().iter().map(|(_, to)| to.to_string()));
    RoutePlan::from_path(&graph, path, &[])
}

/// Live delay measured on one candidate edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDelay {
    pub from: String,
    pub to: String,
    pub minutes: Option<i64>,
}

impl EdgeDelay {
    pub fn weight_minutes(&self) -> i64 {
        self.minutes.unwrap_or(UNKNOWN_DELAY_MINUTES)
    }
}

/// Every edge of both candidate paths.
pub fn candidate_edges() -> impl Iterator<Item = (&'static str, &'static str)> {
    DIRECT_LEGS.into_iter().chain(DETOUR_LEGS)
}

/// Shortest path from Minneapolis to St. Paul with each edge weighted by its
/// live delay. Edges without data weigh [`UNKNOWN_DELAY_MINUTES`].
pub fn plan_by_live_delay(delays: &[EdgeDelay]) -> RoutePlan {
    let mut graph = RouteGraph::i94();
    for d in delays {
        graph.add_edge(&d.from, &d.to, d.weight_minutes() as f64);
    }
    // both paths always exist, so this only falls back on an empty delay list
    let path = graph
        .shortest_path(MINNEAPOLIS, ST_PAUL)
        .unwrap_or_else(|| vec![MINNEAPOLIS.to_string(), ST_PAUL.to_string()]);
    RoutePlan::from_path(&graph, path, delays)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRoute {
    pub index: usize,
    pub travel_time_s: i64,
    pub traffic_delay_s: i64,
    pub distance_km: i64,
    pub congestion_index: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeRanking {
    pub routes: Vec<RankedRoute>,
    /// Set only when every route is at or under the predicted volume.
    pub best: Option<usize>,
}

/// Delay relative to free-flow time, scaled by 1000 and rounded to 2
/// decimals. Zero when there is no free-flow time left.
pub fn congestion_index(travel_time_s: i64, traffic_delay_s: i64) -> f64 {
    let free_flow = travel_time_s - traffic_delay_s;
    if free_flow <= 0 {
        return 0.0;
    }
    let idx = traffic_delay_s as f64 / free_flow as f64 * 1000.0;
    (idx * 100.0).round() / 100.0
}

/// Compares TomTom's candidate routes against the predicted volume. When all
/// of them are at or under it, the shortest (then least congested) wins.
pub fn rank_alternatives(candidates: &[RouteCandidate], predicted_volume: i32) -> AlternativeRanking {
    let routes: Vec<RankedRoute> = candidates
        .iter()
        .enumerate()
        .map(|(index, c)| RankedRoute {
            index,
            travel_time_s: c.travel_time_s,
            traffic_delay_s: c.traffic_delay_s,
            distance_km: c.length_m / 1000,
            congestion_index: congestion_index(c.travel_time_s, c.traffic_delay_s),
        })
        .collect();

    let all_under = routes
        .iter()
        .all(|r| r.congestion_index <= predicted_volume as f64);
    let best = if all_under {
        routes
            .iter()
            .min_by(|a, b| {
                a.distance_km
                    .cmp(&b.distance_km)
                    .then(a.congestion_index.total_cmp(&b.congestion_index))
            })
            .map(|r| r.index)
    } else {
        None
    };
    AlternativeRanking { routes, best }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(plan: &RoutePlan) -> Vec<&str> {
        plan.visible.iter().map(|w| w.name.as_str()).collect()
    }

    #[test]
    fn test_threshold_switch() {
        assert_eq!(select_by_threshold(1349, 1350), RouteChoice::Direct);
        assert_eq!(select_by_threshold(1350, 1350), RouteChoice::Detour);
        assert_eq!(select_by_threshold(1351, 1350), RouteChoice::Detour);
    }

    #[test]
    fn test_direct_plan_hides_detour_points() {
        let plan = plan_for_volume(1000, 1350);
        assert_eq!(plan.choice, RouteChoice::Direct);
        assert_eq!(plan.path, vec![MINNEAPOLIS, ST_PAUL]);
        assert_eq!(names(&plan), vec![MINNEAPOLIS, ST_PAUL]);
        assert_eq!(plan.legs.len(), 1);
        // roughly 8.7 miles between the two centers
        assert!(plan.total_miles > 8.0 && plan.total_miles < 9.5);
    }

    #[test]
    fn test_detour_plan_shows_all_points() {
        let plan = plan_for_volume(1800, 1350);
        assert_eq!(plan.choice, RouteChoice::Detour);
        assert_eq!(
            plan.path,
            vec![MINNEAPOLIS, ALT_ROUTE_1, ALT_ROUTE_2, ST_PAUL]
        );
        assert_eq!(plan.visible.len(), 4);
        assert_eq!(plan.legs.len(), 3);
        let direct = plan_for_volume(1000, 1350).total_miles;
        assert!(plan.total_miles >= direct);
    }

    #[test]
    fn test_congestion_tiers() {
        let t = CongestionTiers::default();
        assert_eq!(t.classify(1199), CongestionLevel::Low);
        assert_eq!(t.classify(1200), CongestionLevel::Moderate);
        assert_eq!(t.classify(1699), CongestionLevel::Moderate);
        assert_eq!(t.classify(1700), CongestionLevel::High);
        assert_eq!(CongestionLevel::High.color(), "red");
    }

    #[test]
    fn test_shortest_path_unreachable_and_unknown() {
        let mut g = RouteGraph::i94();
        assert!(g.shortest_path(MINNEAPOLIS, ST_PAUL).is_none());
        assert!(!g.add_edge(MINNEAPOLIS, "Duluth", 1.0));
        assert!(g.add_edge(MINNEAPOLIS, ALT_ROUTE_1, 1.0));
        assert!(g.shortest_path(MINNEAPOLIS, "Duluth").is_none());
        assert_eq!(
            g.shortest_path(MINNEAPOLIS, ALT_ROUTE_1).unwrap(),
            vec![MINNEAPOLIS, ALT_ROUTE_1]
        );
    }

    fn delays(direct: Option<i64>, detour: [Option<i64>; 3]) -> Vec<EdgeDelay> {
        let mut minutes = vec![direct];
        minutes.extend(detour);
        candidate_edges()
            .zip(minutes)
            .map(|((from, to), minutes)| EdgeDelay {
                from: from.into(),
                to: to.into(),
                minutes,
            })
            .collect()
    }

    #[test]
    fn test_live_delay_prefers_lower_total() {
        let plan = plan_by_live_delay(&delays(Some(12), [Some(2), Some(3), Some(4)]));
        assert_eq!(plan.choice, RouteChoice::Detour);
        assert_eq!(plan.legs[0].delay_minutes, Some(2));

        let plan = plan_by_live_delay(&delays(Some(5), [Some(2), Some(3), Some(4)]));
        assert_eq!(plan.choice, RouteChoice::Direct);
        assert_eq!(plan.legs[0].delay_minutes, Some(5));
    }

    #[test]
    fn test_missing_live_delay_weighs_9999() {
        let plan = plan_by_live_delay(&delays(None, [Some(30), Some(30), Some(30)]));
        assert_eq!(plan.choice, RouteChoice::Detour);

        let plan = plan_by_live_delay(&delays(Some(40), [Some(1), None, Some(1)]));
        assert_eq!(plan.choice, RouteChoice::Direct);
    }

    fn candidate(travel: i64, delay: i64, length_m: i64) -> RouteCandidate {
        RouteCandidate {
            travel_time_s: travel,
            traffic_delay_s: delay,
            length_m,
            points: Vec::new(),
        }
    }

    #[test]
    fn test_congestion_index() {
        assert_eq!(congestion_index(1000, 200), 250.0);
        assert_eq!(congestion_index(900, 100), 125.0);
        assert_eq!(congestion_index(100, 100), 0.0);
        assert_eq!(congestion_index(1000, 300), 428.57);
    }

    #[test]
    fn test_rank_alternatives() {
        let routes = vec![
            candidate(1000, 200, 18_500),
            candidate(900, 100, 16_200),
            candidate(1100, 50, 16_900),
        ];
        let r = rank_alternatives(&routes, 1350);
        // 16 km twice; the less congested one wins
        assert_eq!(r.best, Some(2));
        assert_eq!(r.routes[1].distance_km, 16);

        let r = rank_alternatives(&routes, 200);
        assert_eq!(r.best, None);
        assert!(rank_alternatives(&[], 1350).best.is_none());
    }
}
