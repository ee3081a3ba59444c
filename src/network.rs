use crate::config::{ColumnConfig, LayeringMethod, ReachParams};
use crate::error::{RouteError, RouteResult};
use rusqlite::{Connection, Result as SqliteResult};
use std::collections::BTreeMap;

/// Reach graph shared read-only by every engine.
///
/// All per-reach vectors are indexed by reach id; slot 0 stands for the
/// virtual basin outlet and carries no reach.
#[derive(Debug, Clone)]
pub struct NetworkTopology {
    pub reach_count: usize,
    pub downstream: Vec<u32>,
    pub upstream: Vec<Vec<u32>>,
    pub order: Vec<u32>,
    pub layers: Vec<Vec<u32>>,
    pub layer_of: Vec<usize>,
    pub outlets: Vec<u32>,
}

impl NetworkTopology {
    pub fn build(reaches: &[ReachParams], method: LayeringMethod) -> RouteResult<Self> {
        let n = reaches.len();
        let mut topology = NetworkTopology {
            reach_count: n,
            downstream: vec![0; n + 1],
            upstream: vec![Vec::new(); n + 1],
            order: vec![0; n + 1],
            layers: Vec::new(),
            layer_of: vec![0; n + 1],
            outlets: Vec::new(),
        };

        let mut seen = vec![false; n + 1];
        for reach in reaches {
            let idx = reach.id as usize;
            if reach.id == 0 || idx > n || seen[idx] {
                return Err(RouteError::NonContiguousIds {
                    expected: n,
                    found: reach.id,
                });
            }
            seen[idx] = true;
            check_geometry(reach)?;
            topology.downstream[idx] = reach.downstream;
            topology.order[idx] = reach.order;
        }

        for reach in reaches {
            if reach.downstream as usize > n {
                return Err(RouteError::UnknownDownstream {
                    id: reach.id,
                    downstream: reach.downstream,
                });
            }
        }

        topology.build_upstream_connections();

        match method {
            LayeringMethod::Topological => topology.topological_layers()?,
            LayeringMethod::StreamOrder => topology.stream_order_layers(),
        }
        topology.validate_layers()?;

        if topology.outlets.len() > 1 {
            log::warn!(
                "network has {} outlet reaches: {:?}",
                topology.outlets.len(),
                topology.outlets
            );
        }
        log::info!(
            "network topology built with {} reaches in {} layers",
            n,
            topology.layers.len()
        );
        Ok(topology)
    }

    fn build_upstream_connections(&mut self) {
        self.outlets.clear();
        for id in 1..=self.reach_count {
            match self.downstream[id] {
                0 => self.outlets.push(id as u32),
                down => self.upstream[down as usize].push(id as u32),
            }
        }
    }

    /// Repeatedly peel every reach whose upstream reaches are already layered.
    fn topological_layers(&mut self) -> RouteResult<()> {
        let mut pending: Vec<usize> = self.upstream.iter().map(Vec::len).collect();
        let mut current: Vec<u32> = (1..=self.reach_count as u32)
            .filter(|&id| pending[id as usize] == 0)
            .collect();

        self.layers.clear();
        let mut resolved = 0;
        while !current.is_empty() {
            current.sort_by_key(|&id| (self.order[id as usize], id));
            let mut next = Vec::new();
            for &id in &current {
                self.layer_of[id as usize] = self.layers.len();
                let down = self.downstream[id as usize] as usize;
                if down != 0 {
                    pending[down] -= 1;
                    if pending[down] == 0 {
                        next.push(down as u32);
                    }
                }
            }
            resolved += current.len();
            self.layers.push(std::mem::replace(&mut current, next));
        }

        if resolved != self.reach_count {
            return Err(RouteError::TopologyCycle {
                resolved,
                total: self.reach_count,
            });
        }
        Ok(())
    }

    /// Group by stream order. Only correct if order strictly increases downstream.
    fn stream_order_layers(&mut self) {
        let mut by_order: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for id in 1..=self.reach_count as u32 {
            by_order.entry(self.order[id as usize]).or_default().push(id);
        }
        self.layers = by_order.into_values().collect();
        for (k, layer) in self.layers.iter().enumerate() {
            for &id in layer {
                self.layer_of[id as usize] = k;
            }
        }
    }

    pub fn validate_layers(&self) -> RouteResult<()> {
        for id in 1..=self.reach_count {
            let down = self.downstream[id] as usize;
            if down != 0 && self.layer_of[down] <= self.layer_of[id] {
                return Err(RouteError::LayerOrder {
                    id: id as u32,
                    layer: self.layer_of[id],
                    downstream: down as u32,
                    downstream_layer: self.layer_of[down],
                });
            }
        }
        Ok(())
    }

    /// Reaches in the order they are routed.
    pub fn routing_order(&self) -> impl Iterator<Item = u32> + '_ {
        self.layers.iter().flatten().copied()
    }
}

/// Channel dimensions must be positive. Zero velocity is allowed and
/// replaced by a small celerity in the routing kernel.
fn check_geometry(reach: &ReachParams) -> RouteResult<()> {
    let invalid = |field: &str, value: f64, reason: &'static str| RouteError::InvalidParameter {
        name: format!("reach {} {field}", reach.id),
        value,
        reason,
    };
    for (field, value) in [
        ("length", reach.length),
        ("width", reach.width),
        ("depth", reach.depth),
    ] {
        if !(value > 0.0) {
            return Err(invalid(field, value, "must be positive"));
        }
    }
    if reach.velocity < 0.0 {
        return Err(invalid("velocity", reach.velocity, "must not be negative"));
    }
    if reach.side_slope < 0.0 {
        return Err(invalid("side_slope", reach.side_slope, "must not be negative"));
    }
    Ok(())
}

/// Sort reaches by id so `reaches[id - 1]` addresses reach `id`.
pub fn index_reaches(mut reaches: Vec<ReachParams>) -> RouteResult<Vec<ReachParams>> {
    reaches.sort_by_key(|r| r.id);
    let n = reaches.len();
    for (i, reach) in reaches.iter().enumerate() {
        if reach.id as usize != i + 1 {
            return Err(RouteError::NonContiguousIds {
                expected: n,
                found: reach.id,
            });
        }
    }
    Ok(reaches)
}

// Function to fetch reach parameters from SQLite
pub fn load_reach_parameters(
    conn: &Connection,
    config: &ColumnConfig,
) -> SqliteResult<Vec<ReachParams>> {
    let query = format!(
        "SELECT {} FROM '{}' ORDER BY {}",
        config.select_columns().join(", "),
        config.table,
        config.key
    );

    let mut stmt = conn.prepare(&query)?;
    let rows = stmt.query_map([], |row| {
        let num = |i: usize| -> SqliteResult<f64> {
            Ok(row.get::<_, Option<f64>>(i)?.unwrap_or(0.0))
        };
        Ok(ReachParams {
            id: num(0)? as u32,
            downstream: num(1)?.max(0.0) as u32,
            order: num(2)?.max(0.0) as u32,
            length: num(3)?,
            width: num(4)?,
            depth: num(5)?,
            side_slope: num(6)?,
            velocity: num(7)?,
            slope: num(8)?,
            manning: num(9)?,
            k_bed: num(10)?,
            k_bank: num(11)?,
            cover: num(12)?,
            erod: num(13)?,
            bc1: num(14)?,
            bc2: num(15)?,
            bc3: num(16)?,
            bc4: num(17)?,
            rk1: num(18)?,
            rk2: num(19)?,
            rk3: num(20)?,
            rk4: num(21)?,
            rs1: num(22)?,
            rs2: num(23)?,
            rs3: num(24)?,
            rs4: num(25)?,
            rs5: num(26)?,
            disox: num(27)?,
            bod: num(28)?,
            algae: num(29)?,
            orgn: num(30)?,
            nh4: num(31)?,
            no2: num(32)?,
            no3: num(33)?,
            orgp: num(34)?,
            solp: num(35)?,
        })
    })?;

    let reaches = rows.collect::<SqliteResult<Vec<_>>>()?;
    log::info!("loaded {} reaches from table '{}'", reaches.len(), config.table);
    Ok(reaches)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn reach(id: u32, downstream: u32, order: u32) -> ReachParams {
        ReachParams {
            id,
            downstream,
            order,
            length: 1000.0,
            width: 10.0,
            depth: 1.0,
            side_slope: 2.0,
            velocity: 1.0,
            slope: 0.001,
            ..Default::default()
        }
    }

    // 1,2 -> 3; 4 -> 5; 3,5 -> 6 -> outlet
    fn tree() -> Vec<ReachParams> {
        vec![
            reach(1, 3, 1),
            reach(2, 3, 1),
            reach(3, 6, 2),
            reach(4, 5, 1),
            reach(5, 6, 1),
            reach(6, 0, 3),
        ]
    }

    #[test]
    fn upstream_lists_follow_downstream_ids() {
        let topo = NetworkTopology::build(&tree(), LayeringMethod::Topological).unwrap();
        assert_eq!(topo.upstream[3], vec![1, 2]);
        assert_eq!(topo.upstream[6], vec![3, 5]);
        assert!(topo.upstream[1].is_empty());
        assert_eq!(topo.outlets, vec![6]);
    }

    #[test]
    fn topological_layers_respect_downstream_order() {
        let topo = NetworkTopology::build(&tree(), LayeringMethod::Topological).unwrap();
        assert_eq!(topo.layers, vec![vec![1, 2, 4], vec![5, 3], vec![6]]);
        for id in 1..=6usize {
            let down = topo.downstream[id] as usize;
            if down != 0 {
                assert!(topo.layer_of[id] < topo.layer_of[down]);
            }
        }
        let order: Vec<u32> = topo.routing_order().collect();
        assert_eq!(order.len(), 6);
    }

    #[test]
    fn stream_order_layering_rejects_misordered_network() {
        // reaches 4 and 5 share order 1 although 4 drains into 5
        let err = NetworkTopology::build(&tree(), LayeringMethod::StreamOrder).unwrap_err();
        assert!(matches!(err, RouteError::LayerOrder { id: 4, downstream: 5, .. }));
    }

    #[test]
    fn stream_order_layering_accepts_monotonic_orders() {
        let reaches = vec![reach(1, 3, 1), reach(2, 3, 1), reach(3, 0, 2)];
        let topo = NetworkTopology::build(&reaches, LayeringMethod::StreamOrder).unwrap();
        assert_eq!(topo.layers, vec![vec![1, 2], vec![3]]);
    }

    #[test]
    fn unknown_downstream_fails_fast() {
        let reaches = vec![reach(1, 7, 1), reach(2, 0, 2)];
        let err = NetworkTopology::build(&reaches, LayeringMethod::Topological).unwrap_err();
        assert_eq!(
            err,
            RouteError::UnknownDownstream {
                id: 1,
                downstream: 7
            }
        );
    }

    #[test]
    fn cycle_is_detected() {
        let reaches = vec![reach(1, 2, 1), reach(2, 3, 1), reach(3, 2, 1), reach(4, 0, 1)];
        let err = NetworkTopology::build(&reaches, LayeringMethod::Topological).unwrap_err();
        assert!(matches!(err, RouteError::TopologyCycle { resolved: 2, total: 4 }));
    }

    #[test]
    fn ids_must_be_contiguous() {
        let reaches = vec![reach(1, 0, 1), reach(3, 1, 1)];
        assert!(matches!(
            NetworkTopology::build(&reaches, LayeringMethod::Topological),
            Err(RouteError::NonContiguousIds { .. })
        ));
        assert!(index_reaches(vec![reach(2, 0, 1), reach(1, 2, 1)]).is_ok());
    }

    #[test]
    fn non_physical_geometry_is_rejected() {
        let cases: [(&str, fn(&mut ReachParams)); 5] = [
            ("length", |r| r.length = 0.0),
            ("length", |r| r.length = -1000.0),
            ("width", |r| r.width = 0.0),
            ("depth", |r| r.depth = -0.5),
            ("velocity", |r| r.velocity = -1.0),
        ];
        for (field, spoil) in cases {
            let mut reaches = vec![reach(1, 2, 1), reach(2, 0, 2)];
            spoil(&mut reaches[1]);
            match NetworkTopology::build(&reaches, LayeringMethod::Topological) {
                Err(RouteError::InvalidParameter { name, .. }) => {
                    assert_eq!(name, format!("reach 2 {field}"))
                }
                other => panic!("{field}: expected InvalidParameter, got {other:?}"),
            }
        }

        let mut reaches = vec![reach(1, 0, 1)];
        reaches[0].side_slope = -1.0;
        assert!(NetworkTopology::build(&reaches, LayeringMethod::Topological)
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn zero_velocity_is_accepted() {
        let mut reaches = vec![reach(1, 0, 1)];
        reaches[0].velocity = 0.0;
        reaches[0].side_slope = 0.0;
        assert!(NetworkTopology::build(&reaches, LayeringMethod::Topological).is_ok());
    }

    #[test]
    fn loads_reach_table_from_sqlite() {
        let conn = Connection::open_in_memory().unwrap();
        let config = ColumnConfig::new();
        let columns: Vec<String> = config
            .select_columns()
            .iter()
            .map(|c| format!("{c} REAL"))
            .collect();
        conn.execute(
            &format!("CREATE TABLE reaches ({})", columns.join(", ")),
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO reaches (SUBBASINID, DOWNSTREAM, UP_DOWN_ORDER, CH_LEN, CH_WIDTH, CH_DEPTH) \
             VALUES (2, 0, 2, 500.0, 8.0, 1.5), (1, 2, 1, 1000.0, 5.0, 1.0)",
            [],
        )
        .unwrap();

        let reaches = load_reach_parameters(&conn, &config).unwrap();
        assert_eq!(reaches.len(), 2);
        assert_eq!(reaches[0].id, 1);
        assert_eq!(reaches[0].downstream, 2);
        assert_eq!(reaches[1].width, 8.0);
        assert_eq!(reaches[1].rk1, 0.0);
    }
}
