// ==========================================
// 实时状态与生产指标集成测试
// ==========================================
// 场景 (2025-06-02):
// - 08:00 注册 A / B (Idle), A 开机
// - 09:00 B 开机, A 故障
// - 09:05 B 产出 100 件 (不良 5)
// - 09:10 查询
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod status_overview_test {
    use crate::test_helpers::{setup_env, TestEnv};
    use equipment_oee::domain::{
        DowntimeCategory, LineStatus, MachineStatus, NewMachine, NewProductionOutput, Period, Shift,
    };
    use equipment_oee::engine::EngineError;

    struct Scenario {
        env: TestEnv,
        line_id: i64,
        machine_a: i64,
        machine_b: i64,
    }

    fn scenario() -> Scenario {
        let env = setup_env("2025-06-02 08:00:00");
        let (line_id, a) = env.line_with_machine("LA", "A-01", 60.0);
        let b = env
            .status_engine
            .register_machine(&NewMachine::new(line_id, "Machine B-01", "B-01", 30.0))
            .unwrap();

        env.run(a.machine_id);
        env.advance(3_600);
        env.run(b.machine_id);
        env.break_down(a.machine_id, "Tool wear", DowntimeCategory::Mechanical);
        env.advance(300);
        env.record(b.machine_id, 100, 5, "2025-06-02 09:05:00");
        env.advance(300);

        Scenario {
            line_id,
            machine_a: a.machine_id,
            machine_b: b.machine_id,
            env,
        }
    }

    #[test]
    fn test_line_status_snapshot() {
        let s = scenario();
        let overview = s.env.overview.line_status(s.line_id).unwrap();

        assert_eq!(overview.status, LineStatus::Running);
        assert_eq!(overview.total_machines, 2);
        assert_eq!(overview.status_counts.running, 1);
        assert_eq!(overview.status_counts.breakdown, 1);
        assert_eq!(overview.status_counts.total(), 2);
        assert_eq!(overview.efficiency, 50.0);

        let a = overview.machines.iter().find(|m| m.machine_id == s.machine_a).unwrap();
        assert_eq!(a.status, MachineStatus::Breakdown);
        assert_eq!(a.status_duration, "10m 0s");

        let all = s.env.overview.all_lines_status().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].line_id, s.line_id);
    }

    #[test]
    fn test_machine_status_history() {
        let s = scenario();
        let history = s.env.overview.machine_status_history(s.machine_a, 24).unwrap();

        let statuses: Vec<MachineStatus> = history.iter().map(|h| h.status).collect();
        assert_eq!(
            statuses,
            vec![MachineStatus::Breakdown, MachineStatus::Running, MachineStatus::Idle]
        );
        // 未结束与零时长区间不显示时长
        assert_eq!(history[0].duration, None);
        assert_eq!(history[1].duration.as_deref(), Some("1h 0m"));
        assert_eq!(history[2].duration, None);

        let recent = s.env.overview.machine_status_history(s.machine_a, 0).unwrap();
        assert!(recent.is_empty());
    }

    #[test]
    fn test_status_transition_metrics() {
        let s = scenario();
        let metrics = s
            .env
            .overview
            .status_transition_metrics(s.line_id, Period::Day)
            .unwrap();

        let idle = metrics
            .transitions
            .iter()
            .find(|t| t.status == MachineStatus::Idle)
            .unwrap();
        assert_eq!(idle.count, 2);
        assert_eq!(idle.total_duration, "1h 0m");
        assert_eq!(idle.avg_duration, "30m 0s");
        assert_eq!(idle.percentage, 50.0);

        let running = metrics
            .transitions
            .iter()
            .find(|t| t.status == MachineStatus::Running)
            .unwrap();
        assert_eq!(running.count, 2);
        assert_eq!(running.percentage, 50.0);

        let breakdown = metrics
            .transitions
            .iter()
            .find(|t| t.status == MachineStatus::Breakdown)
            .unwrap();
        assert_eq!(breakdown.count, 1);
        assert_eq!(breakdown.percentage, 0.0);
    }

    #[test]
    fn test_overview_unknown_line() {
        let env = setup_env("2025-06-02 08:00:00");
        assert!(matches!(
            env.overview.line_status(9).unwrap_err(),
            EngineError::NotFound { .. }
        ));
    }

    #[test]
    fn test_real_time_metrics() {
        let s = scenario();
        let metrics = s.env.production.real_time_metrics(s.line_id).unwrap();

        assert_eq!(metrics.line_status, LineStatus::Running);
        assert_eq!(metrics.machines_total, 2);
        assert_eq!(metrics.machines_running, 1);
        assert_eq!(metrics.utilization_rate, 50.0);
        assert_eq!(metrics.last_hour_production, 100);
        assert_eq!(metrics.current_shift.shift, Shift::Morning);
        assert_eq!(metrics.current_shift.produced, 100);
        assert_eq!(metrics.current_shift.rejected, 5);
        assert_eq!(metrics.current_shift.quality_rate, 95.0);
    }

    #[test]
    fn test_machine_performance_and_trends() {
        let s = scenario();
        s.env.record(s.machine_a, 40, 0, "2025-06-02 08:30:00");

        let perf = s.env.production.machine_performance(s.line_id, Period::Day).unwrap();
        assert_eq!(perf.len(), 2);
        assert_eq!(perf[0].machine_id, s.machine_b);
        assert_eq!(perf[0].total_produced, 100);
        assert_eq!(perf[0].efficiency, 95.0);
        assert_eq!(perf[0].current_status, MachineStatus::Running);
        assert_eq!(perf[0].status_duration, 600);
        assert_eq!(perf[1].machine_id, s.machine_a);
        assert_eq!(perf[1].efficiency, 100.0);

        let trends = s.env.production.production_trends(s.line_id, Period::Day).unwrap();
        let buckets: Vec<&str> = trends.iter().map(|t| t.bucket.as_str()).collect();
        assert_eq!(buckets, vec!["2025-06-02 08:00:00", "2025-06-02 09:00:00"]);
        assert_eq!(trends[1].total_produced, 100);
        assert_eq!(trends[1].machines_used, 1);
    }

    #[test]
    fn test_record_output_validation() {
        let s = scenario();
        let base = NewProductionOutput {
            machine_id: s.machine_b,
            production_schedule_id: None,
            quantity_produced: 10,
            quantity_rejected: 0,
            cycle_time: None,
            recorded_at: s.env.clock_now(),
        };

        let zero = NewProductionOutput { quantity_produced: 0, ..base.clone() };
        assert!(matches!(
            s.env.production.record_output(&zero).unwrap_err(),
            EngineError::Validation(_)
        ));

        let too_many_rejects = NewProductionOutput { quantity_rejected: 11, ..base.clone() };
        assert!(matches!(
            s.env.production.record_output(&too_many_rejects).unwrap_err(),
            EngineError::Validation(_)
        ));

        let bad_cycle = NewProductionOutput { cycle_time: Some(-1.0), ..base.clone() };
        assert!(s.env.production.record_output(&bad_cycle).is_err());

        let unknown = NewProductionOutput { machine_id: 999, ..base.clone() };
        assert!(matches!(
            s.env.production.record_output(&unknown).unwrap_err(),
            EngineError::NotFound { .. }
        ));

        let saved = s.env.production.record_output(&base).unwrap();
        assert_eq!(saved.quantity_produced, 10);
    }
}
