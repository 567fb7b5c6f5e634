// ==========================================
// 排产计划集成测试
// ==========================================
// 场景 (2025-03-05 周三 10:00, 周窗口起点 03-03):
// - A: 03-03 早班 计划 100, 开工并报满 → 自动完工
// - B: 03-04 中班 计划 200, 开工报 50 → 已超期
// - C: 03-05 夜班 计划 100, 待开工
// - D: 03-05 夜班 计划 50, 已取消
// - E: 03-01 无班次 计划 80, 待开工 (周窗口之外)
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod schedule_test {
    use crate::test_helpers::{dt, setup_env, TestEnv};
    use chrono::Duration;
    use equipment_oee::config::ProductionConfig;
    use equipment_oee::domain::{
        NewProductionOutput, NewProductionSchedule, Period, ProductionSchedule, ScheduleFilter,
        ScheduleStatus, Shift,
    };
    use equipment_oee::engine::{BroadcastNotifier, EngineError, ProductionMetricsEngine};
    use std::sync::Arc;

    fn new_schedule(line_id: i64, code: &str, planned: i64, start: &str, hours: i64, shift: Option<Shift>) -> NewProductionSchedule {
        let start = dt(start);
        NewProductionSchedule {
            production_line_id: line_id,
            product_name: format!("Product {}", code),
            product_code: code.to_string(),
            planned_quantity: planned,
            scheduled_start: start,
            scheduled_end: start + Duration::hours(hours),
            shift,
        }
    }

    struct Scenario {
        env: TestEnv,
        line_id: i64,
        machine_id: i64,
        a: ProductionSchedule,
        b: ProductionSchedule,
        c: ProductionSchedule,
        d: ProductionSchedule,
    }

    fn scenario() -> Scenario {
        let env = setup_env("2025-03-05 10:00:00");
        let (line_id, machine) = env.line_with_machine("LA", "A-01", 60.0);
        let create = |code: &str, planned: i64, start: &str, shift: Option<Shift>| {
            env.schedules
                .create_schedule(&new_schedule(line_id, code, planned, start, 8, shift))
                .unwrap()
        };

        let a = create("A", 100, "2025-03-03 06:00:00", Some(Shift::Morning));
        let b = create("B", 200, "2025-03-04 06:00:00", Some(Shift::Afternoon));
        let c = create("C", 100, "2025-03-05 14:00:00", Some(Shift::Night));
        let d = create("D", 50, "2025-03-05 18:00:00", Some(Shift::Night));
        create("E", 80, "2025-03-01 06:00:00", None);

        env.schedules.start_schedule(a.schedule_id).unwrap();
        let a = env.schedules.update_progress(a.schedule_id, 100).unwrap();
        env.schedules.start_schedule(b.schedule_id).unwrap();
        let b = env.schedules.update_progress(b.schedule_id, 50).unwrap();
        let d = env.schedules.cancel_schedule(d.schedule_id).unwrap();

        Scenario {
            env,
            line_id,
            machine_id: machine.machine_id,
            a,
            b,
            c,
            d,
        }
    }

    #[test]
    fn test_schedule_lifecycle() {
        let s = scenario();

        assert_eq!(s.a.status, ScheduleStatus::Completed);
        assert_eq!(s.a.actual_start, Some(dt("2025-03-05 10:00:00")));
        assert_eq!(s.a.actual_end, Some(dt("2025-03-05 10:00:00")));
        assert_eq!(s.a.completion_percentage(), 100.0);

        assert_eq!(s.b.status, ScheduleStatus::InProgress);
        assert_eq!(s.b.actual_quantity, 50);
        assert!(s.b.actual_end.is_none());
        assert_eq!(s.d.status, ScheduleStatus::Cancelled);

        s.env.advance(3_600);
        let b = s.env.schedules.complete_schedule(s.b.schedule_id).unwrap();
        assert_eq!(b.status, ScheduleStatus::Completed);
        assert_eq!(b.actual_end, Some(dt("2025-03-05 11:00:00")));
        assert_eq!(s.env.repos.schedule_repo.get(s.b.schedule_id).unwrap(), b);
    }

    #[test]
    fn test_invalid_schedule_transitions_leave_state_untouched() {
        let s = scenario();
        let rejected = |result: Result<ProductionSchedule, EngineError>| {
            assert!(matches!(
                result.unwrap_err(),
                EngineError::InvalidScheduleTransition { .. }
            ));
        };

        rejected(s.env.schedules.complete_schedule(s.c.schedule_id));
        rejected(s.env.schedules.update_progress(s.c.schedule_id, 10));
        rejected(s.env.schedules.start_schedule(s.a.schedule_id));
        rejected(s.env.schedules.cancel_schedule(s.a.schedule_id));
        rejected(s.env.schedules.start_schedule(s.d.schedule_id));

        assert!(matches!(
            s.env.schedules.update_progress(s.b.schedule_id, -1).unwrap_err(),
            EngineError::Validation(_)
        ));
        assert!(matches!(
            s.env.schedules.start_schedule(404).unwrap_err(),
            EngineError::NotFound { .. }
        ));

        let c = s.env.repos.schedule_repo.get(s.c.schedule_id).unwrap();
        assert_eq!(c, s.c);
        assert_eq!(s.env.repos.schedule_repo.get(s.b.schedule_id).unwrap().actual_quantity, 50);
    }

    #[test]
    fn test_create_schedule_validation() {
        let env = setup_env("2025-03-05 10:00:00");
        let (line_id, _machine) = env.line_with_machine("LA", "A-01", 60.0);

        let zero = new_schedule(line_id, "Z", 0, "2025-03-05 12:00:00", 8, None);
        assert!(matches!(
            env.schedules.create_schedule(&zero).unwrap_err(),
            EngineError::Validation(_)
        ));

        let backwards = new_schedule(line_id, "Z", 10, "2025-03-05 12:00:00", 0, None);
        assert!(matches!(
            env.schedules.create_schedule(&backwards).unwrap_err(),
            EngineError::Validation(_)
        ));

        let mut blank = new_schedule(line_id, "Z", 10, "2025-03-05 12:00:00", 8, None);
        blank.product_name = "  ".to_string();
        assert!(env.schedules.create_schedule(&blank).unwrap_err().is_client_error());

        let orphan = new_schedule(99, "Z", 10, "2025-03-05 12:00:00", 8, None);
        assert!(matches!(
            env.schedules.create_schedule(&orphan).unwrap_err(),
            EngineError::NotFound { .. }
        ));

        assert!(env.schedules.list_schedules(&ScheduleFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_schedule_overview_groups_open_schedules() {
        let env = setup_env("2025-03-05 10:00:00");
        let (line_id, _machine) = env.line_with_machine("LA", "A-01", 60.0);
        let create = |code: &str, start: &str| {
            env.schedules
                .create_schedule(&new_schedule(line_id, code, 10, start, 4, None))
                .unwrap()
        };

        create("TODAY", "2025-03-05 12:00:00");
        create("TOMORROW", "2025-03-06 08:00:00");
        create("SUNDAY", "2025-03-09 06:00:00");
        create("NEXT", "2025-03-11 06:00:00");
        create("LATER", "2025-03-20 06:00:00");
        let done = create("DONE", "2025-03-05 06:00:00");
        env.schedules.start_schedule(done.schedule_id).unwrap();
        env.schedules.update_progress(done.schedule_id, 10).unwrap();

        let overview = env.schedules.schedule_overview(Some(line_id)).unwrap();
        let codes = |items: &[ProductionSchedule]| -> Vec<String> {
            items.iter().map(|s| s.product_code.clone()).collect()
        };
        assert_eq!(codes(&overview.today), vec!["TODAY"]);
        assert_eq!(codes(&overview.tomorrow), vec!["TOMORROW"]);
        assert_eq!(codes(&overview.this_week), vec!["TODAY", "TOMORROW", "SUNDAY"]);
        assert_eq!(codes(&overview.next_week), vec!["NEXT"]);

        assert!(matches!(
            env.schedules.schedule_overview(Some(42)).unwrap_err(),
            EngineError::NotFound { .. }
        ));
    }

    #[test]
    fn test_planned_vs_actual_for_week() {
        let s = scenario();
        let report = s.env.schedules.planned_vs_actual(Some(s.line_id), Period::Week).unwrap();

        assert_eq!(report.start_date, dt("2025-03-03 00:00:00"));
        assert_eq!(report.summary.total_schedules, 4);
        assert_eq!(report.summary.completed, 1);
        assert_eq!(report.summary.in_progress, 1);
        assert_eq!(report.summary.pending, 1);
        assert_eq!(report.summary.cancelled, 1);
        assert_eq!(report.summary.total_planned_quantity, 450);
        assert_eq!(report.summary.total_actual_quantity, 150);
        assert_eq!(report.summary.achievement_rate, 33.33);

        let daily: Vec<(&str, i64, i64, i64)> = report
            .daily
            .iter()
            .map(|d| (d.date.as_str(), d.planned, d.actual, d.schedule_count))
            .collect();
        assert_eq!(
            daily,
            vec![
                ("2025-03-03", 100, 100, 1),
                ("2025-03-04", 200, 50, 1),
                ("2025-03-05", 150, 0, 2),
            ]
        );

        // 窗口内无计划时达成率为 0
        let (other_line, _machine) = s.env.line_with_machine("LB", "B-01", 30.0);
        let empty = s.env.schedules.planned_vs_actual(Some(other_line), Period::Week).unwrap();
        assert_eq!(empty.summary.total_schedules, 0);
        assert_eq!(empty.summary.achievement_rate, 0.0);
    }

    #[test]
    fn test_shift_analysis() {
        let s = scenario();
        let analysis = s.env.schedules.shift_analysis(Some(s.line_id), 7).unwrap();

        assert_eq!(analysis.start_date, dt("2025-02-26 00:00:00"));
        let shifts: Vec<(Shift, i64, f64)> = analysis
            .shift_performance
            .iter()
            .map(|p| (p.shift, p.schedule_count, p.avg_achievement))
            .collect();
        assert_eq!(
            shifts,
            vec![
                (Shift::Morning, 1, 100.0),
                (Shift::Afternoon, 1, 25.0),
                (Shift::Night, 2, 0.0),
            ]
        );
        assert_eq!(analysis.best_shift, Some(Shift::Morning));

        for days in [0, 91] {
            assert!(matches!(
                s.env.schedules.shift_analysis(None, days).unwrap_err(),
                EngineError::Validation(_)
            ));
        }
    }

    #[test]
    fn test_delayed_schedules() {
        let s = scenario();
        let delayed = s.env.schedules.delayed_schedules(None).unwrap();

        assert_eq!(delayed.len(), 1);
        let b = &delayed[0];
        assert_eq!(b.schedule_id, s.b.schedule_id);
        assert_eq!(b.line_name, "Line LA");
        assert_eq!(b.delay_hours, 20);
        assert_eq!(b.completion_percentage, 25.0);
        assert_eq!(b.remaining_quantity, 150);
    }

    #[test]
    fn test_schedule_status_board_uses_linked_outputs() {
        let s = scenario();
        s.env.advance(1_800);
        let linked = NewProductionOutput {
            machine_id: s.machine_id,
            production_schedule_id: Some(s.b.schedule_id),
            quantity_produced: 40,
            quantity_rejected: 2,
            cycle_time: Some(60.0),
            recorded_at: s.env.clock_now(),
        };
        s.env.production.record_output(&linked).unwrap();
        s.env.record(s.machine_id, 15, 0, "2025-03-05 10:20:00");

        let board = s.env.schedules.schedule_status(Some(s.line_id)).unwrap();
        let current = board.current.unwrap();
        assert_eq!(current.schedule.schedule_id, s.b.schedule_id);
        assert_eq!(current.completion_percentage, 25.0);
        assert_eq!(current.time_elapsed, 30);
        assert_eq!(current.time_remaining, -1_230);
        assert_eq!(current.recorded_produced, 40);
        assert_eq!(current.recorded_rejected, 2);

        let upcoming: Vec<i64> = board.upcoming.iter().map(|u| u.schedule_id).collect();
        assert_eq!(upcoming, vec![s.c.schedule_id]);
        let completed: Vec<i64> = board.recent_completed.iter().map(|c| c.schedule_id).collect();
        assert_eq!(completed, vec![s.a.schedule_id]);
    }

    #[test]
    fn test_record_output_checks_linked_schedule() {
        let s = scenario();
        let (_other_line, other_machine) = s.env.line_with_machine("LB", "B-01", 30.0);
        let base = NewProductionOutput {
            machine_id: s.machine_id,
            production_schedule_id: Some(s.b.schedule_id),
            quantity_produced: 10,
            quantity_rejected: 0,
            cycle_time: None,
            recorded_at: s.env.clock_now(),
        };

        let wrong_line = NewProductionOutput {
            machine_id: other_machine.machine_id,
            ..base.clone()
        };
        assert!(matches!(
            s.env.production.record_output(&wrong_line).unwrap_err(),
            EngineError::Validation(_)
        ));

        let cancelled = NewProductionOutput {
            production_schedule_id: Some(s.d.schedule_id),
            ..base.clone()
        };
        assert!(matches!(
            s.env.production.record_output(&cancelled).unwrap_err(),
            EngineError::Validation(_)
        ));

        let unknown = NewProductionOutput {
            production_schedule_id: Some(999),
            ..base.clone()
        };
        assert!(matches!(
            s.env.production.record_output(&unknown).unwrap_err(),
            EngineError::NotFound { .. }
        ));

        assert!(s.env.repos.output_repo.list_by_machine(s.machine_id).unwrap().is_empty());
        s.env.production.record_output(&base).unwrap();
        assert_eq!(s.env.repos.output_repo.totals_for_schedule(s.b.schedule_id).unwrap().produced, 10);
    }

    #[test]
    fn test_output_recorded_event_is_broadcast() {
        let s = scenario();
        let notifier = Arc::new(BroadcastNotifier::new(4));
        let mut rx = notifier.subscribe_outputs();
        let production = ProductionMetricsEngine::new(
            s.env.repos.clone(),
            ProductionConfig::default(),
            s.env.clock.clone(),
        )
        .with_notifier(notifier);

        let saved = production
            .record_output(&NewProductionOutput {
                machine_id: s.machine_id,
                production_schedule_id: Some(s.b.schedule_id),
                quantity_produced: 200,
                quantity_rejected: 10,
                cycle_time: Some(58.5),
                recorded_at: s.env.clock_now(),
            })
            .unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.output_id, saved.output_id);
        assert_eq!(event.machine_name, "Machine A-01");
        assert_eq!(event.production_line_id, s.line_id);
        assert_eq!(event.production_schedule_id, Some(s.b.schedule_id));
        assert_eq!(event.quality_rate, 95.0);

        // 校验失败不发通知
        assert!(production
            .record_output(&NewProductionOutput {
                machine_id: s.machine_id,
                production_schedule_id: None,
                quantity_produced: 0,
                quantity_rejected: 0,
                cycle_time: None,
                recorded_at: s.env.clock_now(),
            })
            .is_err());
        assert!(rx.try_recv().is_err());
    }
}
