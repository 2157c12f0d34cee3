//! End-to-end store scenarios against a live PostgreSQL.
//!
//! Ignored by default; run with a scratch database:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/guildwiki_test cargo test -- --ignored
//! ```

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use guildwiki_server::config::ServerConfig;
use guildwiki_server::events::EventConsumer;
use guildwiki_server::gateway::{ChatGateway, Member, MockCall, MockChatGateway, Notification};
use guildwiki_server::scope::Scope;
use guildwiki_server::state::AppState;
use guildwiki_shared::error::WikiError;
use guildwiki_shared::events::WikiEvent;
use guildwiki_shared::ids::{ChannelId, GuildId, MessageId, RevisionId, RoleId, UserId};
use guildwiki_shared::permissions::Permissions;

use futures::TryStreamExt;

static NEXT_GUILD: AtomicI64 = AtomicI64::new(0);

struct Harness {
    state: AppState,
    gateway: Arc<MockChatGateway>,
    guild_id: GuildId,
}

impl Harness {
    async fn new() -> Self {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test db");
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(8)
            .connect(&url)
            .await
            .expect("connect");
        sqlx::migrate!().run(&pool).await.expect("migrate");

        let gateway = Arc::new(MockChatGateway::new());
        let config = ServerConfig { database_url: url, ..ServerConfig::default() };
        let state = AppState::new(pool, config, gateway.clone() as Arc<dyn ChatGateway>)
            .expect("state");

        // a fresh tenant per test keeps titles from colliding
        let base = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos() as i64;
        let guild_id = GuildId(base.wrapping_add(NEXT_GUILD.fetch_add(1, Ordering::SeqCst)));

        Self { state, gateway, guild_id }
    }

    fn member(&self, user_id: i64) -> Member {
        Member {
            guild_id: self.guild_id,
            user_id: UserId(user_id),
            roles: Vec::new(),
            guild_admin: false,
        }
    }

    async fn scope(&self) -> Scope {
        Scope::acquire(&self.state.db).await.expect("acquire")
    }
}

#[tokio::test]
#[ignore]
async fn create_edit_history_roundtrip() {
    let h = Harness::new().await;
    let member = h.member(1);
    let mut scope = h.scope().await;

    h.state.pages.create_page(&mut scope, &member, "Rules", "v1").await.unwrap();
    let page = h.state.pages.get_page(&mut scope, &member, "rules").await.unwrap();
    assert_eq!(page.content.as_deref(), Some("v1"));
    assert!(!page.alias);

    let canonical = h.state.pages.revise_page(&mut scope, &member, "rules", "v2").await.unwrap();
    assert_eq!(canonical, None);
    let page = h.state.pages.get_page(&mut scope, &member, "Rules").await.unwrap();
    assert_eq!(page.content.as_deref(), Some("v2"));

    let history: Vec<_> = h
        .state
        .pages
        .get_page_revisions(&mut scope, &member, "Rules")
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    // newest first, ids strictly increasing
    assert!(history[0].revision_id > history[1].revision_id);
}

#[tokio::test]
#[ignore]
async fn alias_resolves_one_hop_and_edits_the_target() {
    let h = Harness::new().await;
    let member = h.member(1);
    let mut scope = h.scope().await;

    h.state.pages.create_page(&mut scope, &member, "Foo", "x").await.unwrap();
    h.state.pages.alias_page(&mut scope, &member, "Bar", "Foo").await.unwrap();

    let via_alias = h.state.pages.get_page(&mut scope, &member, "bar").await.unwrap();
    assert!(via_alias.alias);
    assert_eq!(via_alias.original_title, "Foo");
    assert_eq!(via_alias.content.as_deref(), Some("x"));

    let canonical = h.state.pages.revise_page(&mut scope, &member, "bar", "y").await.unwrap();
    assert_eq!(canonical.as_deref(), Some("Foo"));
    let target = h.state.pages.get_page(&mut scope, &member, "Foo").await.unwrap();
    assert_eq!(target.content.as_deref(), Some("y"));

    let resolved = h.state.pages.resolve_page(&mut scope, &member, "bar").await.unwrap();
    assert_eq!(resolved.alias.as_deref(), Some("Bar"));
    assert_eq!(resolved.target, "Foo");

    // an alias may not point at an alias
    let err = h.state.pages.alias_page(&mut scope, &member, "Baz", "Bar").await.unwrap_err();
    assert!(matches!(err, WikiError::PageNotFound { .. }));
}

#[tokio::test]
#[ignore]
async fn case_folded_duplicates_are_rejected() {
    let h = Harness::new().await;
    let member = h.member(1);
    let mut scope = h.scope().await;

    h.state.pages.create_page(&mut scope, &member, "Dup", "a").await.unwrap();
    let err = h.state.pages.create_page(&mut scope, &member, "dup", "b").await.unwrap_err();
    assert!(matches!(err, WikiError::PageExists));

    h.state.pages.alias_page(&mut scope, &member, "Other", "Dup").await.unwrap();
    let err = h.state.pages.create_page(&mut scope, &member, "OTHER", "b").await.unwrap_err();
    assert!(matches!(err, WikiError::PageExists));
}

#[tokio::test]
#[ignore]
async fn concurrent_create_race_yields_exactly_one_page() {
    let h = Harness::new().await;
    let member = h.member(1);

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let state = h.state.clone();
        let member = member.clone();
        tasks.push(tokio::spawn(async move {
            let mut scope = Scope::acquire(&state.db).await.unwrap();
            state.pages.create_page(&mut scope, &member, "Race", "body").await
        }));
    }
    let outcomes: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one creator must win: {outcomes:?}");
    assert!(outcomes
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, WikiError::PageExists)));

    let mut scope = h.scope().await;
    let history: Vec<_> = h
        .state
        .pages
        .get_page_revisions(&mut scope, &member, "Race")
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
#[ignore]
async fn missing_permission_blocks_the_action_but_not_reads() {
    let h = Harness::new().await;
    let member = h.member(1);
    let mut scope = h.scope().await;

    // everyone gets view|edit only
    h.state
        .resolver
        .set_role_permissions(
            &mut scope,
            h.guild_id,
            RoleId::everyone(h.guild_id),
            Permissions::VIEW | Permissions::EDIT | Permissions::CREATE,
        )
        .await
        .unwrap();

    h.state.pages.create_page(&mut scope, &member, "Foo", "x").await.unwrap();
    let err = h.state.pages.delete_page(&mut scope, &member, "Foo").await.unwrap_err();
    assert!(matches!(
        err,
        WikiError::MissingPagePermissions { required } if required == Permissions::DELETE
    ));
    assert!(h.state.pages.get_page(&mut scope, &member, "Foo").await.is_ok());
}

#[tokio::test]
#[ignore]
async fn page_deny_override_beats_role_grant() {
    let h = Harness::new().await;
    let admin = Member { guild_admin: true, ..h.member(99) };
    let member = h.member(1);
    let mut scope = h.scope().await;

    h.state.pages.create_page(&mut scope, &member, "Secret", "hidden").await.unwrap();
    h.state
        .resolver
        .add_page_permissions(
            &mut scope,
            &admin,
            "Secret",
            RoleId::everyone(h.guild_id).0,
            Permissions::empty(),
            Permissions::VIEW,
        )
        .await
        .unwrap();

    let effective =
        h.state.resolver.permissions_for(&mut scope, &member, "Secret").await.unwrap();
    assert_eq!(effective, Permissions::DEFAULT & !Permissions::VIEW);

    let err = h.state.pages.get_page(&mut scope, &member, "Secret").await.unwrap_err();
    assert!(matches!(err, WikiError::MissingPagePermissions { .. }));

    // the grey check restores the role-granted default
    h.state
        .resolver
        .unset_page_permissions(
            &mut scope,
            &admin,
            "Secret",
            RoleId::everyone(h.guild_id).0,
            Permissions::VIEW,
        )
        .await
        .unwrap();
    assert!(h.state.pages.get_page(&mut scope, &member, "Secret").await.is_ok());
}

#[tokio::test]
#[ignore]
async fn rename_appends_a_rename_revision_and_keeps_aliases_working() {
    let h = Harness::new().await;
    let member = h.member(1);
    let mut scope = h.scope().await;

    h.state.pages.create_page(&mut scope, &member, "Guidelines", "text").await.unwrap();
    h.state.pages.alias_page(&mut scope, &member, "G", "Guidelines").await.unwrap();
    h.state.pages.rename_page(&mut scope, &member, "Guidelines", "Rules").await.unwrap();

    let renamed = h.state.pages.get_page(&mut scope, &member, "Rules").await.unwrap();
    assert_eq!(renamed.content.as_deref(), Some("text"));

    let history: Vec<_> = h
        .state
        .pages
        .get_page_revisions(&mut scope, &member, "Rules")
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].title, "Rules");
    assert_eq!(history[1].title, "Guidelines");

    // rename revision shares its predecessor's content
    let ids: Vec<RevisionId> = history.iter().map(|r| r.revision_id).collect();
    let details =
        h.state.pages.get_individual_revisions(&mut scope, h.guild_id, &ids).await.unwrap();
    assert_eq!(details[0].content, details[1].content);

    // aliases follow the page id, not the title
    let via_alias = h.state.pages.get_page(&mut scope, &member, "G").await.unwrap();
    assert_eq!(via_alias.original_title, "Rules");

    // the old title is free again
    h.state.pages.create_page(&mut scope, &member, "Guidelines", "new page").await.unwrap();
}

#[tokio::test]
#[ignore]
async fn revert_rejects_revisions_of_other_pages() {
    let h = Harness::new().await;
    let member = h.member(1);
    let mut scope = h.scope().await;

    h.state.pages.create_page(&mut scope, &member, "A", "a1").await.unwrap();
    h.state.pages.create_page(&mut scope, &member, "B", "b1").await.unwrap();

    let history: Vec<_> = h
        .state
        .pages
        .get_page_revisions(&mut scope, &member, "A")
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let a_revision = history[0].revision_id;

    let err = h.state.pages.revert(&mut scope, &member, "B", a_revision).await.unwrap_err();
    assert!(matches!(err, WikiError::InvalidInput(_)));

    h.state.pages.revise_page(&mut scope, &member, "A", "a2").await.unwrap();
    h.state.pages.revert(&mut scope, &member, "A", a_revision).await.unwrap();
    let page = h.state.pages.get_page(&mut scope, &member, "A").await.unwrap();
    assert_eq!(page.content.as_deref(), Some("a1"));

    let missing = h
        .state
        .pages
        .get_individual_revisions(&mut scope, h.guild_id, &[RevisionId(i64::MAX)])
        .await
        .unwrap_err();
    assert!(matches!(missing, WikiError::InvalidInput(_)));
}

#[tokio::test]
#[ignore]
async fn watch_list_roundtrip() {
    let h = Harness::new().await;
    let member = h.member(1);
    let mut scope = h.scope().await;

    h.state.pages.create_page(&mut scope, &member, "Watched", "w").await.unwrap();
    h.state.watch_lists.watch_page(&mut scope, &member, "Watched").await.unwrap();
    // idempotent
    h.state.watch_lists.watch_page(&mut scope, &member, "Watched").await.unwrap();

    let entries: Vec<_> = h
        .state
        .watch_lists
        .watch_list(&mut scope, &member)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title, "Watched");

    assert!(h.state.watch_lists.unwatch_page(&mut scope, &member, "Watched").await.unwrap());
    assert!(!h.state.watch_lists.unwatch_page(&mut scope, &member, "Watched").await.unwrap());
    let entries: Vec<_> = h
        .state
        .watch_lists
        .watch_list(&mut scope, &member)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
#[ignore]
async fn edit_notifies_watchers_and_mirrors_bindings() {
    let h = Harness::new().await;
    let author = h.member(1);
    let watcher = h.member(2);
    h.gateway.add_member(author.clone());
    h.gateway.add_member(watcher.clone());
    let mut scope = h.scope().await;

    h.state.pages.create_page(&mut scope, &author, "Foo", "old line").await.unwrap();
    h.state.watch_lists.watch_page(&mut scope, &watcher, "Foo").await.unwrap();
    h.state.watch_lists.watch_page(&mut scope, &author, "Foo").await.unwrap();
    h.state
        .bindings
        .bind(&mut scope, &author, ChannelId(7), MessageId(8), "Foo")
        .await
        .unwrap();

    h.state.pages.revise_page(&mut scope, &author, "Foo", "new line").await.unwrap();
    let history: Vec<_> = h
        .state
        .pages
        .get_page_revisions(&mut scope, &author, "Foo")
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let event = WikiEvent::PageEdit { revision_id: history[0].revision_id };
    drop(scope);

    h.state.watch_lists.handle_event(event.clone()).await.unwrap();
    h.state.bindings.handle_event(event).await.unwrap();

    let calls = h.gateway.calls();
    let notified: Vec<_> = calls
        .iter()
        .filter_map(|call| match call {
            MockCall::Notify(user, Notification::PageEdited { body, .. }) => Some((user, body)),
            _ => None,
        })
        .collect();
    // the author is never self-notified
    assert_eq!(notified.len(), 1);
    assert_eq!(*notified[0].0, watcher.user_id);
    assert!(notified[0].1.contains("-old line"));
    assert!(notified[0].1.contains("+new line"));

    assert!(calls.iter().any(|call| matches!(
        call,
        MockCall::EditMessage(ChannelId(7), MessageId(8), content) if content == "new line"
    )));
}

#[tokio::test]
#[ignore]
async fn delete_fans_out_and_cleans_up() {
    let h = Harness::new().await;
    let member = h.member(1);
    let watcher = h.member(2);
    h.gateway.add_member(watcher.clone());
    let mut scope = h.scope().await;

    h.state.pages.create_page(&mut scope, &member, "Doomed", "d").await.unwrap();
    h.state.pages.alias_page(&mut scope, &member, "DoomedAlias", "Doomed").await.unwrap();
    h.state.watch_lists.watch_page(&mut scope, &watcher, "Doomed").await.unwrap();
    h.state
        .bindings
        .bind(&mut scope, &member, ChannelId(3), MessageId(4), "Doomed")
        .await
        .unwrap();
    let page = h.state.pages.get_page_partial(&mut scope, &member, "Doomed").await.unwrap();

    let was_alias = h.state.pages.delete_page(&mut scope, &member, "Doomed").await.unwrap();
    assert!(!was_alias);
    let err = h.state.pages.get_page(&mut scope, &member, "Doomed").await.unwrap_err();
    assert!(matches!(err, WikiError::PageNotFound { .. }));
    let err = h.state.pages.get_page(&mut scope, &member, "DoomedAlias").await.unwrap_err();
    assert!(matches!(err, WikiError::PageNotFound { .. }));
    drop(scope);

    let event = WikiEvent::PageDelete {
        guild_id: h.guild_id,
        page_id: page.page_id,
        title: "Doomed".to_string(),
    };
    h.state.watch_lists.handle_event(event.clone()).await.unwrap();
    h.state.bindings.handle_event(event).await.unwrap();

    let calls = h.gateway.calls();
    assert!(calls.iter().any(|call| matches!(
        call,
        MockCall::Notify(user, Notification::PageDeleted { title, .. })
            if *user == watcher.user_id && title == "Doomed"
    )));
    assert!(calls
        .iter()
        .any(|call| matches!(call, MockCall::DeleteMessage(ChannelId(3), MessageId(4)))));

    let mut scope = h.scope().await;
    let entries: Vec<_> = h
        .state
        .watch_lists
        .watch_list(&mut scope, &watcher)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert!(entries.is_empty());
    let err = h.state.bindings.get_bound_page(&mut scope, MessageId(4)).await.unwrap_err();
    assert!(matches!(err, WikiError::BindingNotFound));
}

#[tokio::test]
#[ignore]
async fn deleting_an_alias_needs_only_edit() {
    let h = Harness::new().await;
    let member = h.member(1);
    let mut scope = h.scope().await;

    h.state.pages.create_page(&mut scope, &member, "Kept", "k").await.unwrap();
    h.state.pages.alias_page(&mut scope, &member, "Extra", "Kept").await.unwrap();

    let was_alias = h.state.pages.delete_page(&mut scope, &member, "Extra").await.unwrap();
    assert!(was_alias);
    assert!(h.state.pages.get_page(&mut scope, &member, "Kept").await.is_ok());
}

#[tokio::test]
#[ignore]
async fn statistics_and_usage_log() {
    let h = Harness::new().await;
    let member = h.member(1);
    let other = h.member(2);
    let mut scope = h.scope().await;

    h.state.pages.create_page(&mut scope, &member, "Stats", "s1").await.unwrap();
    h.state.pages.revise_page(&mut scope, &other, "Stats", "s2").await.unwrap();
    h.state.pages.log_page_use(&mut scope, h.guild_id, "Stats").await.unwrap();
    h.state.pages.log_page_use(&mut scope, h.guild_id, "Stats").await.unwrap();

    assert_eq!(h.state.pages.page_count(&mut scope, h.guild_id).await.unwrap(), 1);
    assert_eq!(h.state.pages.revisions_count(&mut scope, h.guild_id).await.unwrap(), 2);
    assert_eq!(
        h.state.pages.page_uses(&mut scope, h.guild_id, "stats", None).await.unwrap(),
        2
    );
    assert_eq!(
        h.state.pages.total_page_uses(&mut scope, h.guild_id, None).await.unwrap(),
        2
    );

    let top = h.state.pages.top_pages(&mut scope, h.guild_id, None).await.unwrap();
    assert_eq!(top[0].title, "Stats");
    assert_eq!(top[0].uses, 2);

    let editors =
        h.state.pages.top_page_editors(&mut scope, h.guild_id, "Stats", None).await.unwrap();
    assert_eq!(editors.len(), 2);
    let total_rank: f64 = editors.iter().map(|e| e.rank).sum();
    assert!((total_rank - 1.0).abs() < 1e-9);

    let err = h
        .state
        .pages
        .top_page_editors(&mut scope, h.guild_id, "NoSuchPage", None)
        .await
        .unwrap_err();
    assert!(matches!(err, WikiError::PageNotFound { .. }));
}

#[tokio::test]
#[ignore]
async fn storage_notifications_reach_the_bus() {
    use guildwiki_server::events::run_listener;

    let h = Harness::new().await;
    let member = h.member(1);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut events = h.state.events.subscribe();
    let listener = tokio::spawn(run_listener(
        h.state.db.clone(),
        h.state.events.clone(),
        shutdown_rx,
    ));
    // give the listener a moment to subscribe
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let mut scope = h.scope().await;
    h.state.pages.create_page(&mut scope, &member, "Live", "v1").await.unwrap();
    drop(scope);

    let event = tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
        .await
        .expect("notification within deadline")
        .unwrap();
    assert!(matches!(event, WikiEvent::PageEdit { .. }));

    shutdown_tx.send(true).unwrap();
    listener.await.unwrap().unwrap();
}

#[tokio::test]
#[ignore]
async fn role_permission_management_respects_the_hierarchy() {
    use guildwiki_server::gateway::Role;

    let h = Harness::new().await;
    let admin = Member { guild_admin: true, ..h.member(99) };
    let mut scope = h.scope().await;

    let low = Role { id: RoleId(h.guild_id.0 + 1), position: 1 };
    let manager = Role { id: RoleId(h.guild_id.0 + 2), position: 5 };
    let high = Role { id: RoleId(h.guild_id.0 + 3), position: 9 };

    // a plain member cannot touch role permissions at all
    let plain = h.member(1);
    let err = h
        .state
        .resolver
        .allow_role_permissions(&mut scope, &plain, low, Permissions::DELETE)
        .await
        .unwrap_err();
    assert!(matches!(err, WikiError::MissingPermissions { .. }));

    // an admin seeds the manager role
    let granted = h
        .state
        .resolver
        .allow_role_permissions(&mut scope, &admin, manager, Permissions::MANAGE_PERMISSIONS)
        .await
        .unwrap();
    assert!(granted.contains(Permissions::MANAGE_PERMISSIONS));

    // a member holding the manager role can edit roles strictly below it
    let wielder = Member {
        roles: vec![manager],
        ..h.member(2)
    };
    let granted = h
        .state
        .resolver
        .allow_role_permissions(&mut scope, &wielder, low, Permissions::DELETE)
        .await
        .unwrap();
    assert!(granted.contains(Permissions::DELETE));

    // but not roles at or above its own position
    let err = h
        .state
        .resolver
        .allow_role_permissions(&mut scope, &wielder, high, Permissions::VIEW)
        .await
        .unwrap_err();
    assert!(matches!(err, WikiError::MissingPermissions { .. }));
    let err = h
        .state
        .resolver
        .allow_role_permissions(&mut scope, &wielder, manager, Permissions::VIEW)
        .await
        .unwrap_err();
    assert!(matches!(err, WikiError::MissingPermissions { .. }));

    // deny removes bits and reports the remainder
    let remaining = h
        .state
        .resolver
        .deny_role_permissions(&mut scope, &wielder, low, Permissions::DELETE)
        .await
        .unwrap();
    assert!(!remaining.contains(Permissions::DELETE));

    // granting to everyone seeds the default row first
    let everyone = Role { id: RoleId::everyone(h.guild_id), position: 0 };
    let granted = h
        .state
        .resolver
        .allow_role_permissions(&mut scope, &admin, everyone, Permissions::DELETE)
        .await
        .unwrap();
    assert_eq!(granted, Permissions::DEFAULT | Permissions::DELETE);
}

#[tokio::test]
#[ignore]
async fn page_overwrite_lifecycle() {
    let h = Harness::new().await;
    let admin = Member { guild_admin: true, ..h.member(99) };
    let member = h.member(1);
    let entity = member.user_id.0;
    let mut scope = h.scope().await;

    h.state.pages.create_page(&mut scope, &member, "Board", "b").await.unwrap();

    // absent rows read as empty overrides
    let (allow, deny) = h
        .state
        .resolver
        .get_page_overwrites_for(&mut scope, h.guild_id, "Board", entity)
        .await
        .unwrap();
    assert!(allow.is_empty() && deny.is_empty());

    // allow and deny merge while staying disjoint
    let (allow, deny) = h
        .state
        .resolver
        .add_page_permissions(&mut scope, &admin, "Board", entity, Permissions::DELETE, Permissions::empty())
        .await
        .unwrap();
    assert_eq!(allow, Permissions::DELETE);
    assert!(deny.is_empty());

    let (allow, deny) = h
        .state
        .resolver
        .add_page_permissions(&mut scope, &admin, "Board", entity, Permissions::empty(), Permissions::DELETE)
        .await
        .unwrap();
    assert!(allow.is_empty());
    assert_eq!(deny, Permissions::DELETE);

    // intersecting allow and deny is rejected up front
    let err = h
        .state
        .resolver
        .add_page_permissions(&mut scope, &admin, "Board", entity, Permissions::VIEW, Permissions::VIEW)
        .await
        .unwrap_err();
    assert!(matches!(err, WikiError::InvalidInput(_)));

    // the listing shows the row, and dropping it requires the row's page
    let rows = h.state.resolver.get_page_overwrites(&mut scope, h.guild_id, "Board").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].entity_id, entity);

    h.state
        .resolver
        .unset_page_overwrites(&mut scope, h.guild_id, "Board", entity)
        .await
        .unwrap();
    let rows = h.state.resolver.get_page_overwrites(&mut scope, h.guild_id, "Board").await.unwrap();
    assert!(rows.is_empty());

    let err = h
        .state
        .resolver
        .unset_page_overwrites(&mut scope, h.guild_id, "NoSuchPage", entity)
        .await
        .unwrap_err();
    assert!(matches!(err, WikiError::PageNotFound { .. }));

    // overrides on a missing page fail through the not-null translation
    let err = h
        .state
        .resolver
        .add_page_permissions(&mut scope, &admin, "NoSuchPage", entity, Permissions::VIEW, Permissions::empty())
        .await
        .unwrap_err();
    assert!(matches!(err, WikiError::PageNotFound { .. }));
}

#[tokio::test]
#[ignore]
async fn bindings_replace_and_unbind() {
    let h = Harness::new().await;
    let member = h.member(1);
    let mut scope = h.scope().await;

    h.state.pages.create_page(&mut scope, &member, "One", "1").await.unwrap();
    h.state.pages.create_page(&mut scope, &member, "Two", "2").await.unwrap();

    let page = h
        .state
        .bindings
        .bind(&mut scope, &member, ChannelId(1), MessageId(10), "One")
        .await
        .unwrap();
    assert_eq!(page.content.as_deref(), Some("1"));

    // rebinding the same message repoints it
    h.state
        .bindings
        .bind(&mut scope, &member, ChannelId(1), MessageId(10), "Two")
        .await
        .unwrap();
    let bound = h.state.bindings.get_bound_page(&mut scope, MessageId(10)).await.unwrap();
    assert_eq!(bound.title, "Two");

    let listed: Vec<_> = h
        .state
        .bindings
        .guild_bindings(&mut scope, &member)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "Two");

    assert!(h.state.bindings.unbind(&mut scope, &member, MessageId(10)).await.unwrap());
    let err = h.state.bindings.unbind(&mut scope, &member, MessageId(10)).await.unwrap_err();
    assert!(matches!(err, WikiError::BindingNotFound));
}

#[tokio::test]
#[ignore]
async fn listings_and_search() {
    let h = Harness::new().await;
    let member = h.member(1);
    let mut scope = h.scope().await;

    h.state.pages.create_page(&mut scope, &member, "beta", "2").await.unwrap();
    h.state.pages.create_page(&mut scope, &member, "Alpha", "1").await.unwrap();

    let all: Vec<_> = h
        .state
        .pages
        .get_all_pages(&mut scope, &member)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let titles: Vec<_> = all.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["Alpha", "beta"]);

    let recent: Vec<_> = h
        .state
        .pages
        .get_recent_revisions(&mut scope, &member, chrono::Utc::now() - chrono::Duration::weeks(2))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(recent.len(), 2);

    let found: Vec<_> = h
        .state
        .pages
        .search_pages(&mut scope, &member, "alpah")
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert!(found.iter().any(|p| p.title == "Alpha"));
}
