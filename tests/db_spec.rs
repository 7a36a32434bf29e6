use speculate2::speculate;
use uuid::Uuid;
use waypoint::db::Database;
use waypoint::models::*;

fn item_input(entity_type: EntityType, title: &str) -> CreateItemInput {
    CreateItemInput {
        entity_type,
        title: title.to_string(),
        details: None,
        plan_data: None,
        parent_id: None,
        blocked_by_id: None,
        position: None,
        assignee: None,
    }
}

#[test]
fn items_survive_a_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("waypoint.db");

    {
        let db = Database::open(path.clone()).expect("open");
        db.migrate().expect("migrate");
        db.create_item(item_input(EntityType::Issue, "Durable"))
            .expect("create");
    }

    let db = Database::open(path).expect("reopen");
    db.migrate().expect("migrate");
    let items = db.list_items(&ListItemsQuery::default()).expect("query");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Durable");
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
    }

    describe "work_items" {
        describe "create_item" {
            it "creates items at their type's initial status" {
                let issue = db.create_item(item_input(EntityType::Issue, "Crash on save")).expect("create");
                let feature = db.create_item(item_input(EntityType::Feature, "Export to CSV")).expect("create");
                let task = db.create_item(item_input(EntityType::Task, "Write exporter")).expect("create");

                assert_eq!(issue.status, "new");
                assert_eq!(feature.status, "draft");
                assert_eq!(task.status, "todo");
            }

            it "assigns per-type short codes starting at 1" {
                let issue1 = db.create_item(item_input(EntityType::Issue, "First")).expect("create");
                let feature = db.create_item(item_input(EntityType::Feature, "Feature")).expect("create");
                let task = db.create_item(item_input(EntityType::Task, "Task")).expect("create");
                let issue2 = db.create_item(item_input(EntityType::Issue, "Second")).expect("create");

                assert_eq!(issue1.code(), "I1");
                assert_eq!(feature.code(), "F1");
                assert_eq!(task.code(), "BT1");
                assert_eq!(issue2.code(), "I2");
            }

            it "round-trips the plan payload" {
                let mut input = item_input(EntityType::Feature, "With plan");
                input.plan_data = Some(serde_json::json!({
                    "steps": ["schema", "exporter", "tests"],
                    "estimate_days": 3,
                }));

                let created = db.create_item(input).expect("create");
                let loaded = db.get_item(created.id).expect("query").expect("exists");

                assert_eq!(loaded.plan_data, created.plan_data);
                assert_eq!(
                    loaded.plan_data.as_ref().unwrap()["estimate_days"],
                    serde_json::json!(3)
                );
            }

            it "rejects a parent that does not exist" {
                let mut input = item_input(EntityType::Task, "Orphan");
                input.parent_id = Some(Uuid::new_v4());

                let result = db.create_item(input);
                assert!(result.is_err());
            }

            it "rejects a blocking item that does not exist" {
                let mut input = item_input(EntityType::Task, "Blocked by ghost");
                input.blocked_by_id = Some(Uuid::new_v4());

                let result = db.create_item(input);
                assert!(result.is_err());
            }
        }

        describe "get_item" {
            it "returns None for an unknown id" {
                let result = db.get_item(Uuid::new_v4()).expect("query");
                assert!(result.is_none());
            }

            it "returns the item by id and by code" {
                let created = db.create_item(item_input(EntityType::Issue, "Lookup me")).expect("create");

                let by_id = db.get_item(created.id).expect("query").expect("exists");
                assert_eq!(by_id.title, "Lookup me");

                let by_code = db
                    .get_item_by_code(EntityType::Issue, created.short_code)
                    .expect("query")
                    .expect("exists");
                assert_eq!(by_code.id, created.id);
            }
        }

        describe "list_items" {
            it "filters by entity type and status" {
                db.create_item(item_input(EntityType::Issue, "One")).expect("create");
                db.create_item(item_input(EntityType::Task, "Two")).expect("create");
                db.create_item(item_input(EntityType::Task, "Three")).expect("create");

                let tasks = db.list_items(&ListItemsQuery {
                    entity_type: Some(EntityType::Task),
                    status: None,
                }).expect("query");
                assert_eq!(tasks.len(), 2);

                let todo = db.list_items(&ListItemsQuery {
                    entity_type: None,
                    status: Some("todo".to_string()),
                }).expect("query");
                assert_eq!(todo.len(), 2);

                let all = db.list_items(&ListItemsQuery::default()).expect("query");
                assert_eq!(all.len(), 3);
            }
        }

        describe "get_children" {
            it "returns children ordered by position" {
                let feature = db.create_item(item_input(EntityType::Feature, "Parent")).expect("create");

                let mut second = item_input(EntityType::Task, "Second");
                second.parent_id = Some(feature.id);
                second.position = Some(2);
                db.create_item(second).expect("create");

                let mut first = item_input(EntityType::Task, "First");
                first.parent_id = Some(feature.id);
                first.position = Some(1);
                db.create_item(first).expect("create");

                let children = db.get_children(feature.id).expect("query");
                assert_eq!(children.len(), 2);
                assert_eq!(children[0].title, "First");
                assert_eq!(children[1].title, "Second");
            }
        }
    }

    describe "transition_rules" {
        it "inserts and deletes custom rules" {
            let rule = TransitionRule {
                entity_type: EntityType::Issue,
                from_status: "new".to_string(),
                to_status: "escalated".to_string(),
                requires_condition: None,
                side_effect: None,
                effect_required: false,
                description: Some("Escalation path".to_string()),
            };
            db.insert_transition_rule(&rule).expect("insert");

            let removed = db
                .delete_transition_rule(EntityType::Issue, "new", "escalated")
                .expect("delete");
            assert!(removed);

            let removed_again = db
                .delete_transition_rule(EntityType::Issue, "new", "escalated")
                .expect("delete");
            assert!(!removed_again);
        }

        it "rejects a second rule for the same move" {
            let rule = TransitionRule {
                entity_type: EntityType::Task,
                from_status: "todo".to_string(),
                to_status: "in_progress".to_string(),
                requires_condition: None,
                side_effect: None,
                effect_required: false,
                description: None,
            };
            // Seeded by the default machine already; the primary key keeps
            // the at-most-one-rule invariant.
            let result = db.insert_transition_rule(&rule);
            assert!(result.is_err());
        }
    }
}
