// ==========================================
// 配置管理集成测试
// ==========================================
// 职责: 验证 config_kv 读写、类型化读取与越界回退
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod config_test {
    use crate::test_helpers::create_test_db;
    use equipment_oee::config::config_manager::config_keys;
    use equipment_oee::config::{ConfigManager, ProductionConfig};
    use equipment_oee::domain::ShiftSchedule;

    fn manager() -> (tempfile::NamedTempFile, ConfigManager) {
        let (temp_file, db_path) = create_test_db().unwrap();
        let manager = ConfigManager::new(&db_path).unwrap();
        (temp_file, manager)
    }

    #[test]
    fn test_defaults_when_empty() {
        let (_tmp, manager) = manager();
        let config = manager.load_production_config().unwrap();
        assert_eq!(config, ProductionConfig::default());
        assert_eq!(config.working_hours_per_day, 16);
        assert_eq!(config.pareto_limit, 10);
    }

    #[test]
    fn test_set_and_load_values() {
        let (_tmp, manager) = manager();
        manager.set_value(config_keys::WORKING_HOURS_PER_DAY, "20").unwrap();
        manager.set_value(config_keys::PARETO_LIMIT, "5").unwrap();
        manager.set_value(config_keys::OEE_TARGET_OVERALL, "80.5").unwrap();
        manager.set_value(config_keys::SHIFT_MORNING_START, "7").unwrap();
        manager.set_value(config_keys::SHIFT_AFTERNOON_START, "15").unwrap();
        manager.set_value(config_keys::SHIFT_NIGHT_START, "23").unwrap();

        let config = manager.load_production_config().unwrap();
        assert_eq!(config.working_hours_per_day, 20);
        assert_eq!(config.pareto_limit, 5);
        assert_eq!(config.oee_targets.overall, 80.5);
        assert_eq!(
            config.shifts,
            ShiftSchedule {
                morning_start: 7,
                afternoon_start: 15,
                night_start: 23
            }
        );

        // UPSERT 覆盖
        manager.set_value(config_keys::WORKING_HOURS_PER_DAY, "8").unwrap();
        assert_eq!(manager.get_working_hours_per_day().unwrap(), 8);
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let (_tmp, manager) = manager();
        manager.set_value(config_keys::WORKING_HOURS_PER_DAY, "30").unwrap();
        manager.set_value(config_keys::PARETO_LIMIT, "zero").unwrap();
        manager.set_value(config_keys::SHIFT_MORNING_START, "16").unwrap();

        let config = manager.load_production_config().unwrap();
        assert_eq!(config.working_hours_per_day, 16);
        assert_eq!(config.pareto_limit, 10);
        assert_eq!(config.shifts, ShiftSchedule::default());

        manager.set_value(config_keys::PARETO_LIMIT, "0").unwrap();
        assert_eq!(manager.get_pareto_limit().unwrap(), 10);
    }

    #[test]
    fn test_config_snapshot() {
        let (_tmp, manager) = manager();
        manager.set_value(config_keys::PARETO_LIMIT, "7").unwrap();
        manager.set_value(config_keys::WORKING_HOURS_PER_DAY, "12").unwrap();

        let snapshot: serde_json::Value = serde_json::from_str(&manager.config_snapshot().unwrap()).unwrap();
        assert_eq!(snapshot["pareto_limit"], "7");
        assert_eq!(snapshot["working_hours_per_day"], "12");
        assert_eq!(
            manager.get_global_config_value("missing_key").unwrap(),
            None
        );
    }
}
