use anyhow::Result;

use orderdesk::db::{self, OrderStatus};
use orderdesk::flow::{self, FlowState, StepOutcome};
use sqlx::SqlitePool;

async fn setup_db() -> Result<SqlitePool> {
    let pool = db::connect_with_pool_size("sqlite::memory:", 1).await?;
    db::init_schema(&pool).await?;
    Ok(pool)
}

async fn seed_user(pool: &SqlitePool, user_id: i64) -> Result<db::User> {
    db::create_user(pool, user_id, Some("tester"), Some("Test"), None).await?;
    Ok(db::get_user(pool, user_id).await?.expect("user just created"))
}

async fn seed_shop(pool: &SqlitePool, name: &str, pass2: bool) -> Result<i64> {
    sqlx::query("INSERT OR IGNORE INTO countries (id, name) VALUES (1, 'Testland')")
        .execute(pool)
        .await?;
    let id = sqlx::query(
        "INSERT INTO shops (name, country_id, purchase_limit, quantity, timeframe,
                            pass2, comment, available)
         VALUES (?, 1, 500, 10, '24h', ?, '', 1)",
    )
    .bind(name)
    .bind(pass2)
    .execute(pool)
    .await?
    .last_insert_rowid();
    Ok(id)
}

async fn reload(pool: &SqlitePool, user_id: i64) -> Result<db::User> {
    Ok(db::get_user(pool, user_id).await?.expect("user exists"))
}

fn state_of(user: &db::User) -> Option<FlowState> {
    user.state.as_deref().and_then(FlowState::from_tag)
}

#[tokio::test]
async fn test_full_order_flow() -> Result<()> {
    let pool = setup_db().await?;
    let user_id = 100;
    seed_user(&pool, user_id).await?;
    let shop_id = seed_shop(&pool, "Alpha", false).await?;

    assert_eq!(flow::start(&pool, user_id).await?, StepOutcome::AskLog);
    let user = reload(&pool, user_id).await?;
    assert_eq!(state_of(&user), Some(FlowState::OrderLog));

    let out = flow::advance_text(&pool, &user, FlowState::OrderLog, "acct-log").await?;
    assert_eq!(out, StepOutcome::AskPass);

    let user = reload(&pool, user_id).await?;
    let out = flow::advance_text(&pool, &user, FlowState::OrderPass, "hunter2").await?;
    let StepOutcome::AskShop(shops) = out else {
        panic!("expected shop choices, got {out:?}");
    };
    assert_eq!(shops.len(), 1);

    let user = reload(&pool, user_id).await?;
    let out = flow::select_shop(&pool, &user, shop_id).await?;
    assert_eq!(out, StepOutcome::AskAmount);

    // Bad amounts re-prompt without advancing.
    let user = reload(&pool, user_id).await?;
    assert_eq!(state_of(&user), Some(FlowState::OrderAmount));
    let out = flow::advance_text(&pool, &user, FlowState::OrderAmount, "12a").await?;
    assert_eq!(out, StepOutcome::WrongAmount);
    let user = reload(&pool, user_id).await?;
    assert_eq!(state_of(&user), Some(FlowState::OrderAmount));

    let out = flow::advance_text(&pool, &user, FlowState::OrderAmount, "120").await?;
    assert_eq!(out, StepOutcome::AskComment);

    let user = reload(&pool, user_id).await?;
    let out = flow::advance_text(&pool, &user, FlowState::OrderComment, "asap please").await?;
    let StepOutcome::Created { order_id } = out else {
        panic!("expected order creation, got {out:?}");
    };

    // The flow is cleared and the order carries every collected answer.
    let user = reload(&pool, user_id).await?;
    assert_eq!(user.state, None);
    assert_eq!(user.state_data, None);

    let order = db::get_order(&pool, order_id).await?.expect("order exists");
    assert_eq!(order.user_id, user_id);
    assert_eq!(order.log, "acct-log");
    assert_eq!(order.pass1, "hunter2");
    assert_eq!(order.shop_id, shop_id);
    assert_eq!(order.pass2, None);
    assert_eq!(order.amount, 120);
    assert_eq!(order.comment, "asap please");
    assert_eq!(order.status(), Some(OrderStatus::Awaiting));
    Ok(())
}

#[tokio::test]
async fn test_pass2_shop_asks_for_second_password() -> Result<()> {
    let pool = setup_db().await?;
    let user_id = 101;
    seed_user(&pool, user_id).await?;
    let shop_id = seed_shop(&pool, "Beta", true).await?;

    flow::start(&pool, user_id).await?;
    let user = reload(&pool, user_id).await?;
    flow::advance_text(&pool, &user, FlowState::OrderLog, "log").await?;
    let user = reload(&pool, user_id).await?;
    flow::advance_text(&pool, &user, FlowState::OrderPass, "pass").await?;

    let user = reload(&pool, user_id).await?;
    let out = flow::select_shop(&pool, &user, shop_id).await?;
    assert_eq!(out, StepOutcome::AskPass2);

    let user = reload(&pool, user_id).await?;
    assert_eq!(state_of(&user), Some(FlowState::OrderPass2));
    let out = flow::advance_text(&pool, &user, FlowState::OrderPass2, "second").await?;
    assert_eq!(out, StepOutcome::AskAmount);
    Ok(())
}

#[tokio::test]
async fn test_stale_shop_selection_is_a_no_op() -> Result<()> {
    let pool = setup_db().await?;
    let user_id = 102;
    seed_user(&pool, user_id).await?;
    seed_shop(&pool, "Gamma", false).await?;

    flow::start(&pool, user_id).await?;
    let user = reload(&pool, user_id).await?;
    flow::advance_text(&pool, &user, FlowState::OrderLog, "log").await?;
    let user = reload(&pool, user_id).await?;
    flow::advance_text(&pool, &user, FlowState::OrderPass, "pass").await?;

    let user = reload(&pool, user_id).await?;
    let out = flow::select_shop(&pool, &user, 9999).await?;
    assert_eq!(out, StepOutcome::Ignored);

    // Still waiting on a shop choice.
    let user = reload(&pool, user_id).await?;
    assert_eq!(state_of(&user), Some(FlowState::OrderShop));
    Ok(())
}

#[tokio::test]
async fn test_replayed_final_step_creates_one_order() -> Result<()> {
    let pool = setup_db().await?;
    let user_id = 103;
    seed_user(&pool, user_id).await?;
    let shop_id = seed_shop(&pool, "Delta", false).await?;

    flow::start(&pool, user_id).await?;
    let user = reload(&pool, user_id).await?;
    flow::advance_text(&pool, &user, FlowState::OrderLog, "log").await?;
    let user = reload(&pool, user_id).await?;
    flow::advance_text(&pool, &user, FlowState::OrderPass, "pass").await?;
    let user = reload(&pool, user_id).await?;
    flow::select_shop(&pool, &user, shop_id).await?;
    let user = reload(&pool, user_id).await?;
    flow::advance_text(&pool, &user, FlowState::OrderAmount, "75").await?;

    // Capture the user as it looked when the final message arrived, then
    // submit it twice as a duplicated update would.
    let user = reload(&pool, user_id).await?;
    let first = flow::advance_text(&pool, &user, FlowState::OrderComment, "dup").await?;
    let second = flow::advance_text(&pool, &user, FlowState::OrderComment, "dup").await?;

    assert!(matches!(first, StepOutcome::Created { .. }));
    assert_eq!(second, StepOutcome::Ignored);

    let history = db::list_order_history(&pool, user_id).await?;
    assert_eq!(history.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_free_text_during_shop_choice_re_presents_shops() -> Result<()> {
    let pool = setup_db().await?;
    let user_id = 104;
    seed_user(&pool, user_id).await?;
    seed_shop(&pool, "Epsilon", false).await?;

    flow::start(&pool, user_id).await?;
    let user = reload(&pool, user_id).await?;
    flow::advance_text(&pool, &user, FlowState::OrderLog, "log").await?;
    let user = reload(&pool, user_id).await?;
    flow::advance_text(&pool, &user, FlowState::OrderPass, "pass").await?;

    let user = reload(&pool, user_id).await?;
    let out = flow::advance_text(&pool, &user, FlowState::OrderShop, "Epsilon please").await?;
    let StepOutcome::AskShop(shops) = out else {
        panic!("expected shops again, got {out:?}");
    };
    assert_eq!(shops.len(), 1);
    assert_eq!(
        state_of(&reload(&pool, user_id).await?),
        Some(FlowState::OrderShop)
    );
    Ok(())
}

#[tokio::test]
async fn test_order_history_is_newest_first() -> Result<()> {
    let pool = setup_db().await?;
    let user_id = 105;
    seed_user(&pool, user_id).await?;
    let shop_id = seed_shop(&pool, "Zeta", false).await?;

    for amount in [10, 20, 30] {
        flow::start(&pool, user_id).await?;
        let user = reload(&pool, user_id).await?;
        flow::advance_text(&pool, &user, FlowState::OrderLog, "log").await?;
        let user = reload(&pool, user_id).await?;
        flow::advance_text(&pool, &user, FlowState::OrderPass, "pass").await?;
        let user = reload(&pool, user_id).await?;
        flow::select_shop(&pool, &user, shop_id).await?;
        let user = reload(&pool, user_id).await?;
        flow::advance_text(&pool, &user, FlowState::OrderAmount, &amount.to_string()).await?;
        let user = reload(&pool, user_id).await?;
        flow::advance_text(&pool, &user, FlowState::OrderComment, "-").await?;
    }

    let history = db::list_order_history(&pool, user_id).await?;
    assert_eq!(history.len(), 3);
    assert!(history[0].id > history[1].id && history[1].id > history[2].id);
    assert_eq!(history[0].shop_name, "Zeta");

    let stats = db::order_stats(&pool, user_id).await?;
    assert_eq!(stats.orders_qty, 3);
    assert_eq!(stats.total, 60);
    Ok(())
}
