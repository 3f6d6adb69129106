mod common;

use common::{RecordingInstaller, TemplateDir, config, db, fixture};
use openmolar_provision::{
    ProvisionError, Provisioner,
    db::Secret,
    error::ErrorKind,
    service::provisioning::ProvisionRequest,
    types::{DatabaseState, RoleName},
};

const ADMIN: &str = "OMAdminGroup_openmolar_demo";
const CLIENT: &str = "OMClientGroup_openmolar_demo";

fn request(name: &str, demo_user: bool, fuzzymatch: bool) -> ProvisionRequest {
    ProvisionRequest {
        name: db(name),
        demo_user,
        fuzzymatch,
    }
}

#[tokio::test]
async fn dropping_an_absent_database_succeeds() {
    let templates = TemplateDir::new("drop-absent");
    let fx = fixture(&config(&templates), RecordingInstaller::default());

    fx.service
        .drop_database(&db("never_created"))
        .await
        .expect("drop of absent database failed");
    fx.service
        .drop_database(&db("never_created"))
        .await
        .expect("second drop failed");
}

#[tokio::test]
async fn created_database_is_listed_and_owned_by_service_account() {
    let templates = TemplateDir::new("create-list");
    let cfg = config(&templates);
    let fx = fixture(&cfg, RecordingInstaller::default());

    assert!(fx.service.list_managed_databases().await.is_empty());

    fx.service
        .create_database(&db("surgery_b"))
        .await
        .expect("create failed");
    fx.service
        .create_database(&db("surgery_a"))
        .await
        .expect("create failed");

    assert_eq!(
        fx.service.list_managed_databases().await,
        vec!["surgery_a".to_string(), "surgery_b".to_string()]
    );
    assert_eq!(
        fx.cluster.database_owner("surgery_a").as_deref(),
        Some(cfg.database.service_account.as_str())
    );
    assert!(fx.cluster.role_exists("OMAdminGroup_surgery_a"));
    assert!(fx.cluster.role_exists("OMClientGroup_surgery_a"));

    fx.service
        .drop_database(&db("surgery_a"))
        .await
        .expect("drop failed");
    assert_eq!(
        fx.service.list_managed_databases().await,
        vec!["surgery_b".to_string()]
    );
}

#[tokio::test]
async fn schema_is_rendered_with_quoted_group_names() {
    let templates = TemplateDir::new("render");
    let fx = fixture(&config(&templates), RecordingInstaller::default());

    fx.service
        .create_database(&db("openmolar_demo"))
        .await
        .expect("create failed");

    let scripts = fx.cluster.history();
    let body = scripts
        .iter()
        .find(|s| s.database == "openmolar_demo" && s.sql.contains("CREATE TABLE patients"))
        .expect("schema body was not executed in the new database");
    assert!(body.sql.contains(&format!("TO \"{ADMIN}\"")));
    assert!(body.sql.contains(&format!("TO \"{CLIENT}\"")));
    assert!(!body.sql.contains("ADMIN_GROUP"));
    assert!(!body.sql.contains("CLIENT_GROUP"));

    let preamble = scripts
        .iter()
        .position(|s| s.sql.contains(&format!("create user \"{ADMIN}\"")))
        .expect("group preamble missing");
    let body_at = scripts
        .iter()
        .position(|s| s.sql.contains("CREATE TABLE patients"))
        .expect("schema body missing");
    assert!(preamble < body_at);
}

#[tokio::test]
async fn provisioning_with_demo_user_grants_both_groups() {
    let templates = TemplateDir::new("demo");
    let cfg = config(&templates);
    let fx = fixture(&cfg, RecordingInstaller::default());

    let report = fx
        .service
        .provision(request("openmolar_demo", true, true))
        .await
        .expect("provision failed");

    assert_eq!(report.state, DatabaseState::DemoUserGranted);
    assert_eq!(report.fuzzymatch_installed, Some(true));
    assert!(fx.cluster.can_login(&cfg.provisioning.demo_user));
    assert!(fx.cluster.is_member(ADMIN, &cfg.provisioning.demo_user));
    assert!(fx.cluster.is_member(CLIENT, &cfg.provisioning.demo_user));
    assert_eq!(
        *fx.installer.installed.lock().unwrap(),
        vec!["openmolar_demo".to_string()]
    );
}

#[tokio::test]
async fn existing_demo_user_is_tolerated() {
    let templates = TemplateDir::new("demo-twice");
    let cfg = config(&templates);
    let fx = fixture(&cfg, RecordingInstaller::default());

    fx.service
        .provision(request("first_practice", true, false))
        .await
        .expect("first provision failed");
    let report = fx
        .service
        .provision(request("second_practice", true, false))
        .await
        .expect("second provision failed");

    assert_eq!(report.state, DatabaseState::DemoUserGranted);
    assert_eq!(report.fuzzymatch_installed, None);
    assert!(fx.cluster.is_member("OMAdminGroup_second_practice", "om_demo"));
    assert!(fx.cluster.is_member("OMClientGroup_second_practice", "om_demo"));
}

#[tokio::test]
async fn fuzzymatch_failure_does_not_fail_provisioning() {
    let templates = TemplateDir::new("fuzzy-fail");
    let fx = fixture(
        &config(&templates),
        RecordingInstaller {
            fail: true,
            ..RecordingInstaller::default()
        },
    );

    let report = fx
        .service
        .provision(request("practice", false, true))
        .await
        .expect("provision failed");
    assert_eq!(report.state, DatabaseState::SchemaApplied);
    assert_eq!(report.fuzzymatch_installed, Some(false));

    let err = fx
        .service
        .install_fuzzy_match(&db("practice"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalProcessFailure);
}

#[tokio::test]
async fn grants_follow_the_requested_flags() {
    let templates = TemplateDir::new("grants");
    let fx = fixture(&config(&templates), RecordingInstaller::default());
    let name = db("openmolar_demo");
    fx.service.create_database(&name).await.expect("create failed");

    let alice = RoleName::parse("alice").unwrap();
    let bob = RoleName::parse("bob").unwrap();
    let carol = RoleName::parse("carol").unwrap();
    for user in [&alice, &bob, &carol] {
        fx.service
            .create_user(user, Some(Secret::new("s3cret")))
            .await
            .expect("create user failed");
    }

    let scripts_before = fx.cluster.history().len();
    assert_eq!(
        fx.service
            .grant_permissions(&alice, &name, false, false)
            .await
            .unwrap(),
        0
    );
    assert_eq!(fx.cluster.history().len(), scripts_before);

    assert_eq!(
        fx.service
            .grant_permissions(&bob, &name, true, false)
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        fx.service
            .grant_permissions(&carol, &name, false, true)
            .await
            .unwrap(),
        1
    );

    assert!(fx.cluster.is_member(ADMIN, "bob"));
    assert!(!fx.cluster.is_member(CLIENT, "bob"));
    assert!(fx.cluster.is_member(CLIENT, "carol"));
    assert!(!fx.cluster.is_member(ADMIN, "carol"));
    assert!(!fx.cluster.is_member(ADMIN, "alice"));
}

#[tokio::test]
async fn users_without_password_get_a_generated_one() {
    let templates = TemplateDir::new("generated");
    let fx = fixture(&config(&templates), RecordingInstaller::default());

    let created = fx
        .service
        .create_user(&RoleName::parse("dentist").unwrap(), None)
        .await
        .expect("create user failed");
    assert_eq!(
        created.generated_password.as_ref().map(Secret::expose),
        Some("Generated123")
    );
    assert!(fx.cluster.can_login("dentist"));

    let supplied = fx
        .service
        .create_user(&RoleName::parse("nurse").unwrap(), Some(Secret::new("x")))
        .await
        .expect("create user failed");
    assert!(supplied.generated_password.is_none());

    let err = fx
        .service
        .create_user(&RoleName::parse("nurse").unwrap(), Some(Secret::new("x")))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StatementFailure);
}

#[tokio::test]
async fn missing_templates_leave_database_and_groups_in_place() {
    let templates = TemplateDir::new("missing");
    let fx = fixture(&config(&templates), RecordingInstaller::default());
    templates.remove_templates();

    let err = fx
        .service
        .create_database(&db("openmolar_demo"))
        .await
        .unwrap_err();
    match &err {
        ProvisionError::SchemaNotApplied { rolled_back, .. } => assert!(!rolled_back),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::TemplateUnavailable);

    assert!(fx.cluster.database_exists("openmolar_demo"));
    assert!(fx.cluster.role_exists(ADMIN));
    assert!(fx.cluster.role_exists(CLIENT));
    assert_eq!(
        fx.service.list_managed_databases().await,
        vec!["openmolar_demo".to_string()]
    );
}

#[tokio::test]
async fn reapplying_schema_recovers_a_database_without_one() {
    let templates = TemplateDir::new("reapply");
    let fx = fixture(&config(&templates), RecordingInstaller::default());
    let name = db("practice");

    fx.cluster.fail_statements_containing("CREATE TABLE patients");
    fx.service.create_database(&name).await.unwrap_err();
    assert!(fx.cluster.database_exists("practice"));

    fx.cluster.clear_failures();
    fx.service
        .apply_schema(&name)
        .await
        .expect("re-applying the schema failed");
    assert!(fx.cluster.role_exists("OMAdminGroup_practice"));
}

#[tokio::test]
async fn rollback_removes_database_but_keeps_groups() {
    let templates = TemplateDir::new("rollback");
    let mut cfg = config(&templates);
    cfg.provisioning.rollback_on_schema_failure = true;
    let fx = fixture(&cfg, RecordingInstaller::default());
    fx.cluster.fail_statements_containing("GRANT ALL ON ALL TABLES");

    let err = fx
        .service
        .create_database(&db("openmolar_demo"))
        .await
        .unwrap_err();
    match &err {
        ProvisionError::SchemaNotApplied { rolled_back, .. } => assert!(rolled_back),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::StatementFailure);
    assert!(!fx.cluster.database_exists("openmolar_demo"));
    assert!(fx.cluster.role_exists(ADMIN));
    assert!(fx.cluster.role_exists(CLIENT));
}

#[tokio::test]
async fn unreachable_cluster_lists_nothing_and_fails_operations() {
    let templates = TemplateDir::new("unreachable");
    let fx = fixture(&config(&templates), RecordingInstaller::default());
    fx.service
        .create_database(&db("practice"))
        .await
        .expect("create failed");

    fx.cluster.set_unreachable(true);
    assert!(fx.service.list_managed_databases().await.is_empty());
    let err = fx
        .service
        .create_database(&db("another"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionFailure);

    fx.cluster.set_unreachable(false);
    assert_eq!(
        fx.service.list_managed_databases().await,
        vec!["practice".to_string()]
    );
}

#[tokio::test]
async fn saved_base_schema_is_used_for_new_databases() {
    let templates = TemplateDir::new("save-schema");
    let fx = fixture(&config(&templates), RecordingInstaller::default());

    fx.service
        .save_schema("CREATE TABLE recalls (serialno int);\n")
        .await
        .expect("save failed");
    let rendered = fx
        .service
        .render_schema(&db("practice"))
        .await
        .expect("render failed");
    assert!(rendered.contains("CREATE TABLE recalls"));
    assert!(!rendered.contains("CREATE TABLE patients"));
    assert!(rendered.contains("\"OMClientGroup_practice\""));
}

#[tokio::test]
async fn control_database_is_never_provisioned() {
    let templates = TemplateDir::new("control-db");
    let cfg = config(&templates);
    let fx = fixture(&cfg, RecordingInstaller::default());
    let control = db(&cfg.database.control_database);
    let demo = RoleName::parse("om_demo").unwrap();

    let results = [
        fx.service.apply_schema(&control).await,
        fx.service.create_database(&control).await,
        fx.service.drop_database(&control).await,
        fx.service.install_fuzzy_match(&control).await,
        fx.service.create_demo_user(&control).await,
        fx.service
            .grant_permissions(&demo, &control, true, true)
            .await
            .map(|_| ()),
        fx.service.drop_database(&db("template1")).await,
    ];
    for result in results {
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput, "{err}");
    }

    assert!(fx.cluster.history().is_empty());
    assert!(fx.cluster.database_exists(&cfg.database.control_database));
    assert!(!fx.cluster.role_exists("OMAdminGroup_openmolar_master"));
    assert!(!fx.cluster.role_exists("OMClientGroup_openmolar_master"));
    assert!(fx.installer.installed.lock().unwrap().is_empty());
}
