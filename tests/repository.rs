//! Repository behaviour against a scripted client.
//!
//! Every test builds its own registry and `MockClient`, scripts the rows the
//! database would return, then checks both the hydrated entities and the SQL
//! that was sent.

use fake::faker::lorem::en::Word;
use fake::Fake;
use pretty_assertions::assert_eq;
use quarry::db::row;
use quarry::{
    entity_ref, impl_entity, Condition, Dialect, Direction, EntityMetadata, ExecuteError, FieldType,
    MemoryMetadataStore, MetadataRegistry, MockClient, QuarryError, Relation, Repository,
    RepositoryProvider, Sort, TransformOptions, Value,
};
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Default, Clone, PartialEq)]
struct Order {
    id: Option<i64>,
    customer_id: i64,
    status: String,
    is_deleted: bool,
}

impl_entity! {
    Order as "order" {
        id,
        customer_id => "customerId",
        status,
        is_deleted => "isDeleted",
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Customer {
    id: Option<i64>,
    name: String,
}

impl_entity! { Customer as "customer" { id, name } }

#[derive(Debug, Default, Clone, PartialEq)]
struct Card {
    id: Option<i64>,
    number: String,
}

impl_entity! { Card as "card" { id, number } }

const CIPHER_KEY: &str = "0123456789abcdef0123456789abcdef";

fn registry() -> Arc<MetadataRegistry> {
    let registry = MetadataRegistry::new(Arc::new(MemoryMetadataStore::new()), "tests");
    registry
        .register(
            "order",
            EntityMetadata::builder("order", "order")
                .field("id", FieldType::Int)
                .field("customerId", FieldType::Int)
                .field("status", FieldType::Plain)
                .field("isDeleted", FieldType::Bool)
                .relation("customer", Relation::many_to_one_default("customer", "customer"))
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
        .register(
            "customer",
            EntityMetadata::builder("customer", "customer")
                .field("id", FieldType::Int)
                .field("name", FieldType::Plain)
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
        .register(
            "card",
            EntityMetadata::builder("card", "card")
                .field("id", FieldType::Int)
                .field("number", FieldType::Ciphered)
                .build()
                .unwrap(),
        )
        .unwrap();
    Arc::new(registry)
}

fn orders(client: &Rc<MockClient>) -> Repository<Order> {
    Repository::new(client.clone(), registry(), TransformOptions::default()).unwrap()
}

fn order_row(id: i64, customer_id: i64, status: &str) -> quarry::Row {
    row([
        ("t1_id", Value::Int(id)),
        ("t1_customerId", Value::Int(customer_id)),
        ("t1_status", Value::from(status)),
        ("t1_isDeleted", Value::Int(0)),
    ])
}

#[test]
fn find_by_id_hydrates_and_caches() {
    let client = Rc::new(MockClient::new());
    client.push_rows(vec![order_row(5, 7, "paid")]);
    let repo = orders(&client);

    let first = repo.find_by_id(5, false).unwrap().unwrap();
    assert_eq!(
        *first.borrow(),
        Order {
            id: Some(5),
            customer_id: 7,
            status: "paid".into(),
            is_deleted: false,
        }
    );

    let again = repo.find_by_id(5, false).unwrap().unwrap();
    assert!(Rc::ptr_eq(&first, &again));
    assert_eq!(
        client.statements(),
        ["SELECT t1.id as t1_id, t1.customerId as t1_customerId, t1.status as t1_status, t1.isDeleted as t1_isDeleted\n\
          FROM order t1\n\
          WHERE t1.id = :id_1\n\
          LIMIT 1"]
    );

    repo.clear();
    assert!(repo.cached(5).is_none());
}

#[test]
fn find_by_id_for_update_locks_rows() {
    let client = Rc::new(MockClient::new());
    let repo = orders(&client);

    assert!(repo.find_by_id(9, true).unwrap().is_none());
    assert!(client.statements()[0].ends_with("LIMIT 1\nFOR UPDATE"));
}

#[test]
fn find_by_pages_sorts_and_indexes() {
    let client = Rc::new(MockClient::new());
    client.push_rows(vec![order_row(12, 1, "new"), order_row(11, 2, "new")]);
    let repo = orders(&client);

    let found = repo
        .find_by(
            vec![Condition::eq("status", "new")],
            Some("id"),
            Some((2, 10)),
            vec![Sort::simple("id", Direction::Desc)],
        )
        .unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(found.get(11).unwrap().borrow().customer_id, 2);
    let sql = &client.statements()[0];
    assert!(sql.contains("WHERE t1.status = :status_1\nORDER BY t1.id DESC\nLIMIT 10\nOFFSET 10"), "{sql}");
}

#[test]
fn find_all_keeps_row_order_without_index() {
    let client = Rc::new(MockClient::new());
    client.push_rows(vec![order_row(3, 1, "a"), order_row(1, 1, "b")]);
    let repo = orders(&client);

    let found = repo.find_all(None).unwrap();
    let statuses: Vec<String> = found.values().map(|o| o.borrow().status.clone()).collect();
    assert_eq!(statuses, ["a", "b"]);
    assert!(repo.cached(3).is_some());
}

#[test]
fn repeated_conditions_get_distinct_placeholders() {
    let client = Rc::new(MockClient::new());
    let repo = orders(&client);

    repo.find_by(
        vec![Condition::eq("status", "new"), Condition::eq("status", "paid")],
        None,
        None,
        Vec::new(),
    )
    .unwrap();

    let executed = client.executed();
    assert!(executed[0].sql.contains("t1.status = :status_1 AND t1.status = :status_2"));
    assert_eq!(executed[0].params.get("status_2"), Some(&Value::from("paid")));
}

#[test]
fn many_to_one_condition_joins_target_table() {
    let client = Rc::new(MockClient::new());
    let repo = orders(&client);

    repo.find_one_by(vec![Condition::eq("customer.name", "Alice")]).unwrap();

    let sql = &client.statements()[0];
    assert!(sql.contains("\nLEFT JOIN customer t2 ON t1.customerId = t2.id\n"), "{sql}");
    assert!(sql.contains("WHERE t2.name = :name_1"), "{sql}");
}

#[test]
fn relative_indexed_with_no_ids_sends_nothing() {
    let client = Rc::new(MockClient::new());
    let customers: Repository<Customer> =
        Repository::new(client.clone(), registry(), TransformOptions::default()).unwrap();

    let found = customers.find_by_relative_indexed::<Order>(&[], None, false).unwrap();
    assert!(found.is_empty());
    assert!(client.statements().is_empty());
}

#[test]
fn relative_indexed_collects_unique_ids() {
    let client = Rc::new(MockClient::new());
    client.push_rows(vec![
        row([("t1_id", Value::Int(7)), ("t1_name", Value::from("Alice"))]),
        row([("t1_id", Value::Int(8)), ("t1_name", Value::from("Bob"))]),
    ]);
    let customers: Repository<Customer> =
        Repository::new(client.clone(), registry(), TransformOptions::default()).unwrap();

    let list: Vec<_> = [7, 7, 8]
        .into_iter()
        .map(|customer_id| {
            entity_ref(Order {
                customer_id,
                ..Order::default()
            })
        })
        .collect();
    let found = customers.find_by_relative_indexed(&list, None, false).unwrap();

    assert_eq!(found.get(8).unwrap().borrow().name, "Bob");
    let executed = client.executed();
    assert!(executed[0].sql.contains("t1.id IN (:id_1_0, :id_1_1)"));
    assert_eq!(executed[0].params.len(), 2);
}

#[test]
fn create_writes_generated_id_back() {
    let client = Rc::new(MockClient::new());
    client.push_insert_id(42);
    let repo = orders(&client);
    let status: String = Word().fake();

    let mut order = Order {
        customer_id: 7,
        status: status.clone(),
        ..Order::default()
    };
    repo.create(&mut order, true).unwrap();

    assert_eq!(order.id, Some(42));
    let executed = client.executed();
    assert_eq!(
        executed[0].sql,
        "INSERT INTO order\n    (`customerId`,`status`,`isDeleted`)\nVALUES\n    (:customerId, :status, :isDeleted)"
    );
    assert_eq!(executed[0].params.get("status"), Some(&Value::Text(status)));
    assert_eq!(executed[0].params.get("isDeleted"), Some(&Value::Int(0)));
}

#[test]
fn create_with_explicit_id_keeps_it() {
    let client = Rc::new(MockClient::new());
    let repo = orders(&client);

    let mut order = Order {
        id: Some(100),
        status: "new".into(),
        ..Order::default()
    };
    repo.create(&mut order, false).unwrap();

    assert_eq!(order.id, Some(100));
    assert!(client.statements()[0].contains("(`id`,`customerId`,`status`,`isDeleted`)"));
}

#[test]
fn update_subset_of_fields() {
    let client = Rc::new(MockClient::new());
    let repo = orders(&client);
    let order = Order {
        id: Some(5),
        customer_id: 7,
        status: "shipped".into(),
        is_deleted: false,
    };

    repo.update(&order, Some(&["status"][..])).unwrap();
    assert_eq!(client.statements(), ["UPDATE order\nSET `status` = :status\nWHERE id = :id"]);

    let err = repo.update(&order, Some(&["colour"][..])).unwrap_err();
    assert!(matches!(err, QuarryError::Configuration(_)));
}

#[test]
fn soft_and_hard_delete() {
    let client = Rc::new(MockClient::new());
    let repo = orders(&client);
    let mut order = Order {
        id: Some(5),
        ..Order::default()
    };

    repo.delete(&mut order, false).unwrap();
    assert!(order.is_deleted);
    repo.delete(&mut order, true).unwrap();

    let executed = client.executed();
    assert_eq!(executed[0].sql, "UPDATE order\nSET `isDeleted` = :isDeleted\nWHERE id = :id");
    assert_eq!(executed[0].params.get("isDeleted"), Some(&Value::Int(1)));
    assert_eq!(executed[1].sql, "DELETE FROM order WHERE id = :id");
    assert_eq!(executed[1].params.get("id"), Some(&Value::Int(5)));
}

#[test]
fn soft_delete_needs_flag_field() {
    let client = Rc::new(MockClient::new());
    let customers: Repository<Customer> =
        Repository::new(client.clone(), registry(), TransformOptions::default()).unwrap();
    let mut customer = Customer {
        id: Some(1),
        name: "Alice".into(),
    };

    assert!(matches!(
        customers.delete(&mut customer, false),
        Err(QuarryError::Configuration(_))
    ));
    assert!(client.statements().is_empty());
}

#[test]
fn found_rows_depends_on_dialect() {
    let client = Rc::new(MockClient::new());
    client.push_rows(vec![row([("FOUND_ROWS()", 37i64)])]);
    assert_eq!(orders(&client).get_found_rows().unwrap(), 37);

    let pg = Rc::new(MockClient::with_dialect(Dialect::Postgres));
    assert!(matches!(
        orders(&pg).get_found_rows(),
        Err(QuarryError::Configuration(_))
    ));
}

#[test]
fn postgres_dialect_quotes_identifiers() {
    let client = Rc::new(MockClient::with_dialect(Dialect::Postgres));
    let repo = orders(&client);

    let mut order = Order {
        customer_id: 7,
        status: "new".into(),
        ..Order::default()
    };
    repo.create(&mut order, true).unwrap();
    repo.update(&order, Some(&["isDeleted"][..])).unwrap();

    client.push_rows(vec![order_row(9, 7, "paid")]);
    let found = repo.find_by_id(9, false).unwrap().unwrap();
    assert_eq!(found.borrow().customer_id, 7);

    assert_eq!(
        client.statements(),
        [
            "INSERT INTO \"order\"\n    (\"customerId\",\"status\",\"isDeleted\")\nVALUES\n    (:customerId, :status, :isDeleted)",
            "UPDATE \"order\"\nSET \"isDeleted\" = :isDeleted\nWHERE \"id\" = :id",
            "SELECT t1.\"id\" as \"t1_id\", t1.\"customerId\" as \"t1_customerId\", t1.\"status\" as \"t1_status\", t1.\"isDeleted\" as \"t1_isDeleted\"\n\
             FROM \"order\" t1\n\
             WHERE t1.\"id\" = :id_1\n\
             LIMIT 1",
        ]
    );
    assert_eq!(
        repo.select_columns("o", &["customerId"]),
        ["o.\"customerId\" as \"o_customerId\""]
    );
}

#[test]
fn reread_rows_replace_cached_instance() {
    let client = Rc::new(MockClient::new());
    client
        .push_rows(vec![row([("t1_id", Value::Int(1)), ("t1_name", Value::from("a"))])])
        .push_rows(vec![row([("t1_id", Value::Int(1)), ("t1_name", Value::from("b"))])]);
    let customers: Repository<Customer> =
        Repository::new(client.clone(), registry(), TransformOptions::default()).unwrap();

    let first = customers.find_by_id(1, false).unwrap().unwrap();
    assert_eq!(first.borrow().name, "a");

    let all = customers.find_all(None).unwrap();
    let reread = customers.find_by_id(1, false).unwrap().unwrap();

    assert!(!Rc::ptr_eq(&first, &reread));
    assert!(Rc::ptr_eq(all.get(0).unwrap(), &reread));
    assert_eq!(reread.borrow().name, "b");
    assert_eq!(first.borrow().name, "a");
    assert_eq!(client.statements().len(), 2);
}

#[test]
fn find_by_id_for_update_bypasses_cache() {
    let client = Rc::new(MockClient::new());
    client
        .push_rows(vec![order_row(5, 7, "new")])
        .push_rows(vec![order_row(5, 7, "paid")]);
    let repo = orders(&client);

    let cached = repo.find_by_id(5, false).unwrap().unwrap();
    let locked = repo.find_by_id(5, true).unwrap().unwrap();

    assert!(!Rc::ptr_eq(&cached, &locked));
    assert_eq!(locked.borrow().status, "paid");
    assert!(Rc::ptr_eq(&repo.cached(5).unwrap(), &locked));
    let statements = client.statements();
    assert_eq!(statements.len(), 2);
    assert!(statements[1].ends_with("LIMIT 1\nFOR UPDATE"));
}

#[test]
fn driver_errors_propagate_unchanged() {
    let client = Rc::new(MockClient::new());
    client.push_error(ExecuteError::new(Some("40001"), "Deadlock found"));

    match orders(&client).find_all(None) {
        Err(QuarryError::Execute(err)) => {
            assert!(err.is_deadlock());
            assert_eq!(err.message(), "Deadlock found");
        }
        other => panic!("expected execute error, got {other:?}"),
    }
}

#[test]
fn ciphered_fields_round_trip_through_storage() {
    let client = Rc::new(MockClient::new());
    let cards: Repository<Card> = Repository::new(
        client.clone(),
        registry(),
        TransformOptions::with_cipher_key(CIPHER_KEY),
    )
    .unwrap();

    let mut card = Card {
        id: Some(1),
        number: "4111 1111 1111 1111".into(),
    };
    cards.create(&mut card, false).unwrap();

    let stored = client.executed()[0].params.get("number").cloned().unwrap();
    assert_ne!(stored, Value::from("4111 1111 1111 1111"));

    client.push_rows(vec![row([("t1_id", Value::Int(2)), ("t1_number", stored)])]);
    let found = cards.find_by_id(2, false).unwrap().unwrap();
    assert_eq!(found.borrow().number, "4111 1111 1111 1111");
}

#[test]
fn ciphered_fields_need_a_key() {
    let client = Rc::new(MockClient::new());
    let cards: Repository<Card> =
        Repository::new(client.clone(), registry(), TransformOptions::default()).unwrap();
    let mut card = Card {
        id: Some(1),
        number: "secret".into(),
    };

    assert!(matches!(
        cards.create(&mut card, false),
        Err(QuarryError::Configuration(_))
    ));
}

#[test]
fn provider_shares_repositories() {
    let client = Rc::new(MockClient::new());
    client.push_rows(vec![order_row(5, 7, "paid")]);
    let provider = RepositoryProvider::new(client.clone(), registry(), TransformOptions::default());

    let first = provider.get::<Order>().unwrap();
    let second = provider.get::<Order>().unwrap();
    assert!(Rc::ptr_eq(&first, &second));

    first.find_by_id(5, false).unwrap();
    assert!(second.cached(5).is_some());
    provider.clear();
    assert!(first.cached(5).is_none());
}
