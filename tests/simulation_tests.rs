#[cfg(test)]
mod tests {
    use orbital_grid_engine::delegator::Delegator;
    use orbital_grid_engine::ledger::TxKind;
    use orbital_grid_engine::pricing::PricingEngine;
    use orbital_grid_engine::units::EARTH_RADIUS_KM;
    use orbital_grid_engine::world::WorldState;
    use orbital_grid_engine::*;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn spec(energy_need: f64, processing_power_needed: f64, priority: Priority) -> TaskSpec {
        TaskSpec { energy_need, processing_power_needed, priority }
    }

    fn sat(id: &str) -> NodeId {
        NodeId::from(id)
    }

    fn drone(id: &str) -> CarrierId {
        CarrierId::from(id)
    }

    /// Node, carrier and concurrency bounds that must hold after every tick.
    fn assert_world_invariants(sim: &Simulation) {
        let world = sim.world();
        for node in world.nodes.values() {
            assert!(
                node.energy >= 0.0 && node.energy <= node.max_energy,
                "tick {}: {} energy {} outside [0, {}]",
                sim.tick(), node.id, node.energy, node.max_energy
            );
            assert!(
                world.engaged_at(&node.id) <= sim.config().max_drones_per_node,
                "tick {}: {} has {} engaged carriers",
                sim.tick(), node.id, world.engaged_at(&node.id)
            );
        }
        for carrier in world.carriers.values() {
            assert!(carrier.reserve >= 0.0, "{} reserve {}", carrier.id, carrier.reserve);
            assert!(carrier.payload >= 0.0 && carrier.payload <= carrier.payload_max);
            assert!(carrier.is_consistent(), "{} in {:?} with {:?}", carrier.id, carrier.status, carrier.target);
        }
    }

    // ========== Invariants Under Load ==========

    #[test]
    fn test_energy_stays_clamped_under_sustained_load() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        for tick in 0..600u64 {
            // Heavy enough to starve nodes.
            for i in 0..3 {
                let priority = [Priority::Low, Priority::Medium, Priority::High][((tick + i) % 3) as usize];
                sim.inject_task(spec(15.0, 300.0, priority)).unwrap();
            }
            sim.tick_core();
            assert_world_invariants(&sim);
        }
        assert_eq!(sim.tick(), 600);
    }

    #[test]
    fn test_concurrency_cap_holds_with_forced_launches() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        sim.world_mut().nodes.get_mut(&sat("sat-01")).unwrap().energy = 5.0;

        let launched = sim.launch_carrier(5, &sat("sat-01")).unwrap();
        assert_eq!(launched.len(), 5);
        assert_eq!(sim.world().carriers.len(), 5);

        for _ in 0..40 {
            sim.tick_core();
            assert!(sim.world().engaged_at(&sat("sat-01")) <= 2);
            assert_world_invariants(&sim);
        }
    }

    #[test]
    fn test_state_corruption_is_clamped_and_reported() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        sim.world_mut().nodes.get_mut(&sat("sat-02")).unwrap().energy = 150.0;

        let result = sim.tick_core();

        assert_eq!(sim.world().nodes[&sat("sat-02")].energy, 120.0);
        let corrected = result.events.iter().any(|e| matches!(
            &e.kind,
            EventKind::AlertStateCorrected { entity, clamped, .. } if entity == "sat-02" && *clamped == 120.0
        ));
        assert!(corrected, "no alert.state_corrected for sat-02");
        // The clock keeps going.
        sim.tick_core();
        assert_eq!(sim.tick(), 2);
    }

    // ========== Ledger Costs ==========

    #[test]
    fn test_charge_and_recharge_transactions_are_free() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        sim.world_mut().nodes.get_mut(&sat("sat-03")).unwrap().energy = 4.0;
        sim.launch_carrier(1, &sat("sat-03")).unwrap();

        sim.run_batch(120);

        let txs = sim.ledger().transactions();
        assert!(txs.iter().any(|t| t.kind == TxKind::Charge), "rescue never charged");
        for tx in txs.iter().filter(|t| t.kind != TxKind::Harvest) {
            assert!(tx.total_cost.is_zero(), "{:?} cost {}", tx.kind, tx.total_cost);
            assert!(tx.price_per_unit.is_zero());
        }
    }

    #[test]
    fn test_harvest_cost_uses_price_at_harvest_time() {
        let cfg = SimConfig::default();
        let mut world = WorldState::empty(1);
        world.add_node(Node::new("sat-01", 110.0, 120.0, 2000.0).with_owner("OrbitPower Inc"));
        world.add_carrier(
            Carrier::new("drone-01", 3000.0, 0.0, 120.0)
                .with_owner("DroneFleet Co")
                .with_status(CarrierStatus::Harvesting, Some(Target::Node(sat("sat-01")))),
        );
        let mut sim = Simulation::with_world(cfg.clone(), world).unwrap();
        let pricing = PricingEngine::new(cfg.base_price);

        let mut harvests = 0;
        for _ in 0..6 {
            let before = sim.world().nodes[&sat("sat-01")].energy;
            let seen = sim.ledger().transaction_count();
            sim.tick_core();

            for tx in sim.ledger().transactions()[seen..].iter().filter(|t| t.kind == TxKind::Harvest) {
                assert_eq!(tx.price_per_unit, pricing.price_for_utilization(before / 120.0));
                assert_eq!(tx.total_cost, tx.price_per_unit.times_energy(tx.energy_amount));
                assert!(!tx.total_cost.is_zero());
                harvests += 1;
            }
            assert!(sim.world().nodes[&sat("sat-01")].energy >= cfg.harvest_floor);
        }

        // 110 -> 100 -> 90 -> 80 -> 70, then the floor ends the mission.
        assert_eq!(harvests, 4);
        assert_eq!(sim.world().nodes[&sat("sat-01")].energy, cfg.harvest_floor);
        assert_eq!(sim.ledger().transactions()[0].price_per_unit, Credits(dec!(0.035)));
        assert_eq!(sim.ledger().transactions()[3].price_per_unit, Credits(dec!(0.05)));
    }

    #[test]
    fn test_harvest_from_85_moves_ten_units() {
        let mut world = WorldState::empty(1);
        world.add_node(Node::new("sat-01", 85.0, 120.0, 2000.0));
        world.add_carrier(
            Carrier::new("drone-01", 3000.0, 0.0, 120.0)
                .with_status(CarrierStatus::Harvesting, Some(Target::Node(sat("sat-01")))),
        );
        let mut sim = Simulation::with_world(SimConfig::default(), world).unwrap();

        sim.tick_core();

        assert_eq!(sim.world().nodes[&sat("sat-01")].energy, 75.0);
        assert_eq!(sim.world().carriers[&drone("drone-01")].payload, 10.0);
        let txs = sim.ledger().transactions();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].kind, TxKind::Harvest);
        assert_eq!(txs[0].energy_amount, 10.0);
        assert_eq!(txs[0].total_cost, Credits(dec!(0.5)));
    }

    #[test]
    fn test_return_leg_of_1000km_costs_one_reserve_unit() {
        let lat = (1000.0 / EARTH_RADIUS_KM).to_degrees();
        let mut world = WorldState::empty(1);
        world.add_node(Node::new("sat-01", 120.0, 120.0, 2000.0).with_position(Position::new(0.0, 120.0)));
        world.add_carrier(
            Carrier::new("drone-01", 5.0, 0.0, 120.0)
                .with_position(Position::new(lat, 0.0))
                .with_status(CarrierStatus::Returning, Some(Target::Source)),
        );
        let mut sim = Simulation::with_world(SimConfig::default(), world).unwrap();

        let result = sim.tick_core();

        let carrier = &sim.world().carriers[&drone("drone-01")];
        assert!((carrier.reserve - 4.0).abs() < 1e-6, "reserve {}", carrier.reserve);
        assert_eq!(carrier.payload, carrier.payload_max);
        assert_eq!(carrier.status, CarrierStatus::AtSource);

        let recharges: Vec<_> = sim
            .ledger()
            .transactions()
            .iter()
            .filter(|t| t.kind == TxKind::SourceRecharge)
            .collect();
        assert_eq!(recharges.len(), 1);
        assert!(recharges[0].total_cost.is_zero());
        assert_eq!(recharges[0].energy_amount, 120.0);
        assert_eq!(result.events.iter().filter(|e| e.kind.name() == "carrier.recharged").count(), 1);
    }

    // ========== Pricing ==========

    #[test]
    fn test_price_multiplier_scenarios() {
        let pricing = PricingEngine::new(Credits(dec!(0.05)));
        let healthy = Node::new("sat-01", 90.0, 120.0, 2000.0);
        let scarce = Node::new("sat-02", 20.0, 120.0, 2000.0);
        assert_eq!(pricing.multiplier(healthy.utilization()), dec!(1.0));
        assert_eq!(pricing.multiplier(scarce.utilization()), dec!(2.5));
        assert_eq!(pricing.price(&scarce), Credits(dec!(0.125)));
    }

    #[test]
    fn test_price_is_non_increasing_in_utilization() {
        let pricing = PricingEngine::new(Credits(dec!(0.05)));
        let mut last = pricing.price_for_utilization(0.0);
        for step in 1..=120 {
            let price = pricing.price_for_utilization(step as f64 / 100.0);
            assert!(price <= last, "price rose at utilization {}", step as f64 / 100.0);
            last = price;
        }
        // Same bracket, same price.
        assert_eq!(pricing.price_for_utilization(0.41), pricing.price_for_utilization(0.59));
    }

    // ========== Delegation ==========

    fn task(id: &str, processing: f64, priority: Priority) -> Task {
        Task {
            id: TaskId::from(id),
            energy_need: 5.0,
            processing_power_needed: processing,
            priority,
            created_at: 0,
        }
    }

    #[test]
    fn test_delegator_is_deterministic_with_stable_tie_break() {
        let delegator = Delegator::from_config(&SimConfig::default());
        let mut nodes = BTreeMap::new();
        for id in ["sat-b", "sat-a", "sat-c"] {
            nodes.insert(sat(id), Node::new(id, 80.0, 120.0, 2000.0));
        }
        let t = task("task-1", 500.0, Priority::Medium);

        let first = delegator.select(&t, &nodes).unwrap();
        for _ in 0..50 {
            assert_eq!(delegator.select(&t, &nodes).unwrap(), first);
        }
        assert_eq!(first.0, sat("sat-a"));
    }

    #[test]
    fn test_oversized_task_is_dropped_with_no_capacity() {
        let mut world = WorldState::empty(1);
        world.add_node(Node::new("sat-01", 100.0, 120.0, 1500.0));
        let mut sim = Simulation::with_world(SimConfig::default(), world).unwrap();

        let task_id = sim.inject_task(spec(5.0, 2000.0, Priority::High)).unwrap();
        let result = sim.tick_core();

        let dropped = result.events.iter().any(|e| matches!(
            &e.kind,
            EventKind::TaskDropped { task_id: id, reason: DropReason::NoCapacity } if *id == task_id
        ));
        assert!(dropped, "expected a NoCapacity drop");
        assert!(!result.events.iter().any(|e| e.kind.name() == "task.assigned"));
        assert!(sim.world().nodes[&sat("sat-01")].tasks.is_empty());
        assert!(sim.world().pending.is_empty());
        assert_eq!(result.summary.tasks_assigned, 0);
        assert_eq!(result.summary.tasks_dropped, 1);
    }

    // ========== Equilibrium and Auto-Dispatch ==========

    /// Run `ticks` ticks with sat-03 drained below the auto-dispatch threshold.
    fn run_with_drained_node(config: SimConfig, ticks: u64) -> Vec<SimEvent> {
        let mut sim = Simulation::new(config).unwrap();
        sim.world_mut().nodes.get_mut(&sat("sat-03")).unwrap().energy = 5.0;
        let mut events = Vec::new();
        for _ in 0..ticks {
            events.extend(sim.tick_core().events);
        }
        events
    }

    fn auto_launches_to(events: &[SimEvent], node: &NodeId) -> usize {
        events
            .iter()
            .filter(|e| matches!(&e.kind, EventKind::CarrierLaunched { auto: true, node_id, .. } if node_id == node))
            .count()
    }

    #[test]
    fn test_monitor_auto_dispatches_to_needy_node() {
        let events = run_with_drained_node(SimConfig::default(), 30);
        assert!(events.iter().any(|e| e.kind.name() == "equilibrium.update"));
        assert!(auto_launches_to(&events, &sat("sat-03")) >= 1);
    }

    #[test]
    fn test_disabled_auto_dispatch_launches_nothing() {
        let config = SimConfig { auto_dispatch_enabled: false, ..SimConfig::default() };
        let events = run_with_drained_node(config, 30);
        assert!(events.iter().any(|e| e.kind.name() == "equilibrium.update"));
        assert!(!events.iter().any(|e| matches!(e.kind, EventKind::CarrierLaunched { auto: true, .. })));
    }

    #[test]
    fn test_short_window_still_runs_checks() {
        let too_short = SimConfig { window_ticks: 5, ..SimConfig::default() };
        assert!(matches!(Simulation::new(too_short), Err(EngineError::ConfigInvalid(_))));

        let config = SimConfig { window_ticks: 5, min_samples: 5, ..SimConfig::default() };
        let events = run_with_drained_node(config, 30);
        assert!(events.iter().any(|e| e.kind.name() == "equilibrium.update"));
        assert!(auto_launches_to(&events, &sat("sat-03")) >= 1);
    }

    // ========== Control Operations ==========

    #[test]
    fn test_invalid_config_is_rejected_whole() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        let patch = ConfigPatch { harvest_rate: Some(4.0), harvest_floor: Some(-1.0), ..Default::default() };

        let err = sim.set_config(&patch).unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid(_)));

        sim.tick_core();
        assert_eq!(sim.config().harvest_rate, SimConfig::default().harvest_rate);
    }

    #[test]
    fn test_reset_restores_seed_and_clears_ledger() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        let seeded = sim.snapshot();
        sim.world_mut().nodes.get_mut(&sat("sat-02")).unwrap().energy = 3.0;
        sim.launch_carrier(1, &sat("sat-02")).unwrap();
        sim.run_batch(30);
        assert!(sim.ledger().transaction_count() > 0);

        sim.reset();

        assert_eq!(sim.tick(), 0);
        assert_eq!(sim.ledger().transaction_count(), 0);
        let snap = sim.snapshot();
        assert_eq!(snap.nodes, seeded.nodes);
        assert_eq!(snap.carriers, seeded.carriers);
    }

    // ========== Events ==========

    #[test]
    fn test_events_are_ordered_and_end_with_tick() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        for tick in 1..=30u64 {
            sim.inject_task(spec(5.0, 400.0, Priority::Low)).unwrap();
            let result = sim.tick_core();
            let last = result.events.last().unwrap();
            assert_eq!(last.kind.name(), "tick");
            assert_eq!(last.tick, tick);
            assert!(result.events.windows(2).all(|w| w[0].tick <= w[1].tick));
        }
    }

    #[test]
    fn test_events_survive_json_round_trip() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        sim.world_mut().nodes.get_mut(&sat("sat-04")).unwrap().energy = 6.0;
        sim.launch_carrier(1, &sat("sat-04")).unwrap();
        sim.inject_task(spec(5.0, 400.0, Priority::High)).unwrap();

        let mut names = Vec::new();
        for _ in 0..20 {
            for event in sim.tick_core().events {
                let json = serde_json::to_string(&event).unwrap();
                let value: serde_json::Value = serde_json::from_str(&json).unwrap();
                assert_eq!(value["type"], event.kind.name());
                let back: SimEvent = serde_json::from_str(&json).unwrap();
                assert_eq!(back.tick, event.tick);
                assert_eq!(serde_json::to_value(&back).unwrap(), value);
                names.push(event.kind.name());
            }
        }
        for expected in ["task.created", "task.assigned", "carrier.launched", "carrier.charged", "transaction.completed", "tick"] {
            assert!(names.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn test_partial_config_json_fills_defaults() {
        let cfg: SimConfig = serde_json::from_str(r#"{"harvest_rate": 6.0, "travel_instant": false}"#).unwrap();
        assert_eq!(cfg.harvest_rate, 6.0);
        assert!(!cfg.travel_instant);
        assert_eq!(cfg.harvest_floor, SimConfig::default().harvest_floor);

        let json = serde_json::to_string(&SimConfig::default()).unwrap();
        let back: SimConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SimConfig::default());
    }
}
