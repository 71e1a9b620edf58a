use chrono::{NaiveDate, Utc};

use concierge_core::domain::agent::{Agent, AgentId};
use concierge_core::domain::appointment::{
    Appointment, AppointmentId, AppointmentStatus, CreatedVia,
};
use concierge_core::domain::compliment::Compliment;
use concierge_core::domain::conversation::Message;
use concierge_core::domain::document::{DocumentStatus, KnowledgeDocument};

use concierge_db::migrations::run_pending;
use concierge_db::repositories::{
    AgentRepository, AppointmentRepository, ComplimentRepository, ConversationRepository,
    DocumentRepository, RepositoryError, SqlAgentRepository, SqlAppointmentRepository,
    SqlComplimentRepository, SqlConversationRepository, SqlDocumentRepository,
};
use concierge_core::config::DatabaseConfig;
use concierge_db::{connect, DbPool};

async fn test_pool() -> DbPool {
    // A single connection keeps every query on the same in-memory database.
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        timeout_secs: 5,
    };
    let pool = connect(&config).await.expect("connect");
    run_pending(&pool).await.expect("migrate");
    pool
}

async fn seed_agent(pool: &DbPool) -> Agent {
    let agent = Agent::new("inbox-42", "Clinic Bot", "You schedule dental appointments.");
    SqlAgentRepository::new(pool.clone()).insert(&agent).await.expect("insert agent");
    agent
}

fn appointment(agent_id: AgentId, day: u32, start_minute: u16, duration: u16) -> Appointment {
    Appointment {
        id: AppointmentId::new(),
        agent_id: Some(agent_id),
        account_id: None,
        customer_external_id: "cust-1".to_string(),
        customer_name: "Ada Lovelace".to_string(),
        date: NaiveDate::from_ymd_opt(2025, 6, day).expect("date"),
        start_minute,
        duration_minutes: duration,
        subject: "checkup".to_string(),
        status: AppointmentStatus::Confirmed,
        created_via: CreatedVia::Chatbot,
        cancellation_reason: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn agent_round_trips_with_permissions_and_llm_config() {
    let pool = test_pool().await;
    let repo = SqlAgentRepository::new(pool.clone());

    let mut agent = Agent::new("inbox-7", "Salon Bot", "You book haircuts.");
    agent.permissions.manage_appointments = true;
    repo.insert(&agent).await.expect("insert");

    let loaded = repo
        .find_active_by_routing_key("inbox-7")
        .await
        .expect("query")
        .expect("agent present");
    assert_eq!(loaded.id, agent.id);
    assert!(loaded.permissions.manage_appointments);
    assert!(!loaded.permissions.send_email);

    let mut updated = loaded.clone();
    updated.is_active = false;
    repo.save(&updated).await.expect("save");
    assert!(repo.find_active_by_routing_key("inbox-7").await.expect("query").is_none());
    assert!(repo.find_by_id(&agent.id).await.expect("query").is_some());
}

#[tokio::test]
async fn find_or_create_returns_the_same_conversation_per_customer() {
    let pool = test_pool().await;
    let agent = seed_agent(&pool).await;
    let repo = SqlConversationRepository::new(pool.clone());

    let first = repo.find_or_create(agent.id, "ig-1001").await.expect("create");
    let second = repo.find_or_create(agent.id, "ig-1001").await.expect("find");
    assert_eq!(first.id, second.id);

    let other = repo.find_or_create(agent.id, "ig-1002").await.expect("create");
    assert_ne!(first.id, other.id);
}

#[tokio::test]
async fn append_message_keeps_message_count_consistent() {
    let pool = test_pool().await;
    let agent = seed_agent(&pool).await;
    let repo = SqlConversationRepository::new(pool.clone());

    let conversation = repo.find_or_create(agent.id, "ig-1001").await.expect("create");
    for text in ["hi", "do you have anything tomorrow?", "morning works"] {
        repo.append_message(&Message::customer(conversation.id, text)).await.expect("append");
    }

    let reloaded = repo.find_or_create(agent.id, "ig-1001").await.expect("reload");
    assert_eq!(reloaded.message_count, 3);
}

#[tokio::test]
async fn recent_messages_returns_last_n_oldest_first() {
    let pool = test_pool().await;
    let agent = seed_agent(&pool).await;
    let repo = SqlConversationRepository::new(pool.clone());

    let conversation = repo.find_or_create(agent.id, "ig-1001").await.expect("create");
    for n in 0..6 {
        repo.append_message(&Message::customer(conversation.id, format!("message {n}")))
            .await
            .expect("append");
    }

    let window = repo.recent_messages(conversation.id, 4).await.expect("window");
    assert_eq!(window.len(), 4);
    assert_eq!(window[0].content, "message 2");
    assert_eq!(window[3].content, "message 5");
}

#[tokio::test]
async fn create_if_free_rejects_overlapping_slots() {
    let pool = test_pool().await;
    let agent = seed_agent(&pool).await;
    let repo = SqlAppointmentRepository::new(pool.clone());

    repo.create_if_free(&appointment(agent.id, 2, 600, 60)).await.expect("first create");

    let overlap = repo.create_if_free(&appointment(agent.id, 2, 630, 30)).await;
    assert!(matches!(overlap, Err(RepositoryError::Conflict(_))));

    // Half-open intervals: a slot starting exactly at the end is fine.
    repo.create_if_free(&appointment(agent.id, 2, 660, 30)).await.expect("adjacent create");
}

#[tokio::test]
async fn racing_creates_for_one_slot_admit_exactly_one() {
    let pool = test_pool().await;
    let agent = seed_agent(&pool).await;
    let repo = SqlAppointmentRepository::new(pool.clone());

    let first = appointment(agent.id, 2, 600, 30);
    let second = appointment(agent.id, 2, 600, 30);
    let (a, b) = tokio::join!(repo.create_if_free(&first), repo.create_if_free(&second));

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn cancelled_appointments_free_their_slot() {
    let pool = test_pool().await;
    let agent = seed_agent(&pool).await;
    let repo = SqlAppointmentRepository::new(pool.clone());

    let mut original = appointment(agent.id, 2, 600, 30);
    repo.create_if_free(&original).await.expect("create");
    original.cancel("customer request").expect("cancel");
    repo.update_status(&original).await.expect("update");

    repo.create_if_free(&appointment(agent.id, 2, 600, 30)).await.expect("rebook");

    let slots = repo
        .booked_slots(
            agent.id,
            NaiveDate::from_ymd_opt(2025, 6, 1).expect("date"),
            NaiveDate::from_ymd_opt(2025, 6, 8).expect("date"),
        )
        .await
        .expect("slots");
    assert_eq!(slots.len(), 1);
}

#[tokio::test]
async fn list_for_customer_orders_by_date_and_start() {
    let pool = test_pool().await;
    let agent = seed_agent(&pool).await;
    let repo = SqlAppointmentRepository::new(pool.clone());

    repo.create_if_free(&appointment(agent.id, 3, 540, 30)).await.expect("create");
    repo.create_if_free(&appointment(agent.id, 2, 900, 30)).await.expect("create");
    repo.create_if_free(&appointment(agent.id, 2, 600, 30)).await.expect("create");

    let appointments = repo.list_for_customer(agent.id, "cust-1").await.expect("list");
    let order: Vec<(u32, u16)> = appointments
        .iter()
        .map(|appt| {
            use chrono::Datelike;
            (appt.date.day(), appt.start_minute)
        })
        .collect();
    assert_eq!(order, vec![(2, 600), (2, 900), (3, 540)]);
}

#[tokio::test]
async fn document_lifecycle_processing_to_ready_and_error() {
    let pool = test_pool().await;
    let agent = seed_agent(&pool).await;
    let repo = SqlDocumentRepository::new(pool.clone());

    let document = KnowledgeDocument::uploaded(agent.id, "pricing.pdf", 2048);
    repo.insert(&document).await.expect("insert");

    repo.mark_ready(&document.id, 4, 19).await.expect("mark ready");
    let ready = repo.find_by_id(&document.id).await.expect("query").expect("present");
    assert_eq!(ready.status, DocumentStatus::Ready);
    assert_eq!(ready.page_count, 4);
    assert_eq!(ready.chunk_count, 19);

    repo.mark_error(&document.id, "embedding provider unreachable").await.expect("mark error");
    let failed = repo.find_by_id(&document.id).await.expect("query").expect("present");
    assert_eq!(failed.status, DocumentStatus::Error);
    assert_eq!(failed.error_detail.as_deref(), Some("embedding provider unreachable"));

    repo.delete(&document.id).await.expect("delete");
    assert!(repo.find_by_id(&document.id).await.expect("query").is_none());
}

#[tokio::test]
async fn compliments_are_recorded() {
    let pool = test_pool().await;
    let agent = seed_agent(&pool).await;
    let repo = SqlComplimentRepository::new(pool.clone());

    repo.insert(&Compliment::new(agent.id, "ig-1001", "Best service in town!"))
        .await
        .expect("insert");
}
