//! Lending ledger tests on the in-memory store

use std::sync::Arc;

use lms_server::{
    config::AppConfig,
    error::AppError,
    models::{
        book::{Book, BookMetadata, BookQuery, CreateBook, NextAvailable, RemovedCopy, UpdateBook},
        issue::{CreateIssueRequest, IssueStatus, ReaderCopy, RequestStatus, RequestType},
        user::{NewUser, Principal, Role},
    },
    repository::{MemoryStore, Store},
    services::{ledger::Stocked, Services},
};

struct Fixture {
    store: Arc<dyn Store>,
    services: Services,
    owner: Principal,
    admin: Principal,
    other_admin: Principal,
    reader: Principal,
    second_reader: Principal,
    library: i32,
    other_library: i32,
}

async fn account(store: &Arc<dyn Store>, email: &str, role: Role, libraries: &[i32]) -> Principal {
    let user = store
        .users_create(
            &NewUser {
                name: email.to_string(),
                email: email.to_string(),
                password_hash: "unused".to_string(),
                contact: String::new(),
                role,
            },
            libraries,
        )
        .await
        .unwrap();
    Principal::new(user.id, role)
}

/// Two libraries with an admin each; both readers belong to the first one
async fn setup() -> Fixture {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let library = store.libraries_create("Central", "Main street").await.unwrap().id;
    let other_library = store.libraries_create("Annex", "Side street").await.unwrap().id;

    let owner = account(&store, "owner@example.org", Role::Owner, &[]).await;
    let admin = account(&store, "admin@example.org", Role::Admin, &[library]).await;
    let other_admin = account(&store, "annex@example.org", Role::Admin, &[other_library]).await;
    let reader = account(&store, "reader@example.org", Role::User, &[library]).await;
    let second_reader = account(&store, "second@example.org", Role::User, &[library]).await;

    let services = Services::new(store.clone(), &AppConfig::default());

    Fixture {
        store,
        services,
        owner,
        admin,
        other_admin,
        reader,
        second_reader,
        library,
        other_library,
    }
}

fn new_book(isbn: &str, library_id: i32, copies: i32) -> CreateBook {
    CreateBook {
        isbn: isbn.to_string(),
        library_id,
        total_copies: copies,
        metadata: BookMetadata {
            title: "Dune".to_string(),
            authors: "Frank Herbert".to_string(),
            publisher: "Chilton".to_string(),
            version: "1".to_string(),
        },
    }
}

impl Fixture {
    async fn stock(&self, isbn: &str, copies: i32) -> Book {
        match self
            .services
            .ledger
            .add_or_restock_book(&self.admin, new_book(isbn, self.library, copies))
            .await
            .unwrap()
        {
            Stocked::Created(book) | Stocked::Restocked(book) => book,
        }
    }

    async fn book(&self, isbn: &str) -> Option<Book> {
        self.store.books_get(isbn, self.library).await.unwrap()
    }

    fn copy_for(&self, reader: &Principal) -> ReaderCopy {
        ReaderCopy {
            user_id: reader.user_id,
            library_id: self.library,
        }
    }

    fn request(&self, isbn: &str) -> CreateIssueRequest {
        CreateIssueRequest {
            isbn: isbn.to_string(),
            library_id: self.library,
        }
    }
}

fn assert_copies_consistent(book: &Book) {
    assert!(book.available_copies >= 0);
    assert!(book.available_copies <= book.total_copies);
}

#[tokio::test]
async fn test_request_approve_issue_scenario() {
    let fx = setup().await;
    fx.stock("111", 2).await;

    let request = fx
        .services
        .ledger
        .request_issue(&fx.reader, fx.request("111"))
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.request_type, RequestType::Issue);

    let approved = fx.services.ledger.approve_issue(&fx.admin, request.id).await.unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);
    assert_eq!(approved.approver_id, Some(fx.admin.user_id));
    assert!(approved.approval_date.is_some());
    // Approval does not touch copies
    assert_eq!(fx.book("111").await.unwrap().available_copies, 2);

    let record = fx
        .services
        .ledger
        .issue_book_to_user(&fx.admin, "111", fx.copy_for(&fx.reader))
        .await
        .unwrap();
    assert_eq!(record.issue_status, IssueStatus::Issued);
    assert_eq!(record.reader_id, fx.reader.user_id);
    assert_eq!(record.issue_approver_id, fx.admin.user_id);
    assert_eq!(
        record.expected_return_date - record.issue_date,
        chrono::Duration::days(14)
    );

    let book = fx.book("111").await.unwrap();
    assert_eq!(book.available_copies, 1);
    assert_eq!(book.total_copies, 2);

    let requests = fx.services.ledger.status_issue(&fx.reader).await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].status, RequestStatus::Issued);
}

#[tokio::test]
async fn test_issue_without_available_copies_changes_nothing() {
    let fx = setup().await;
    fx.stock("111", 1).await;
    fx.services
        .ledger
        .issue_book_to_user(&fx.admin, "111", fx.copy_for(&fx.reader))
        .await
        .unwrap();

    let before = fx.book("111").await.unwrap();
    let result = fx
        .services
        .ledger
        .issue_book_to_user(&fx.admin, "111", fx.copy_for(&fx.second_reader))
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(fx.book("111").await.unwrap(), before);
    assert!(fx
        .services
        .ledger
        .my_issues(&fx.second_reader)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_issue_of_last_copy() {
    let fx = setup().await;
    fx.stock("111", 1).await;

    let first = {
        let ledger = fx.services.ledger.clone();
        let (admin, copy) = (fx.admin, fx.copy_for(&fx.reader));
        tokio::spawn(async move { ledger.issue_book_to_user(&admin, "111", copy).await })
    };
    let second = {
        let ledger = fx.services.ledger.clone();
        let (admin, copy) = (fx.admin, fx.copy_for(&fx.second_reader));
        tokio::spawn(async move { ledger.issue_book_to_user(&admin, "111", copy).await })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::Validation(_))))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(rejected, 1);
    let book = fx.book("111").await.unwrap();
    assert_eq!(book.available_copies, 0);
    assert_copies_consistent(&book);
}

#[tokio::test]
async fn test_duplicate_pending_request_conflicts() {
    let fx = setup().await;
    fx.stock("111", 2).await;

    fx.services
        .ledger
        .request_issue(&fx.reader, fx.request("111"))
        .await
        .unwrap();
    let second = fx.services.ledger.request_issue(&fx.reader, fx.request("111")).await;
    assert!(matches!(second, Err(AppError::Conflict(_))));

    // Another reader is not blocked
    fx.services
        .ledger
        .request_issue(&fx.second_reader, fx.request("111"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_request_again_after_disapproval() {
    let fx = setup().await;
    fx.stock("111", 1).await;

    let request = fx
        .services
        .ledger
        .request_issue(&fx.reader, fx.request("111"))
        .await
        .unwrap();
    let disapproved = fx
        .services
        .ledger
        .disapprove_issue(&fx.admin, request.id)
        .await
        .unwrap();
    assert_eq!(disapproved.status, RequestStatus::Disapproved);
    assert_eq!(disapproved.approver_id, Some(fx.admin.user_id));
    assert!(disapproved.approval_date.is_none());

    fx.services
        .ledger
        .request_issue(&fx.reader, fx.request("111"))
        .await
        .unwrap();
    assert_eq!(fx.services.ledger.status_issue(&fx.reader).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_request_preconditions_in_order() {
    let fx = setup().await;

    let missing = fx.services.ledger.request_issue(&fx.reader, fx.request("999")).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    fx.services
        .ledger
        .add_or_restock_book(&fx.other_admin, new_book("222", fx.other_library, 1))
        .await
        .unwrap();
    let not_member = fx
        .services
        .ledger
        .request_issue(
            &fx.reader,
            CreateIssueRequest {
                isbn: "222".to_string(),
                library_id: fx.other_library,
            },
        )
        .await;
    assert!(matches!(not_member, Err(AppError::Authorization(_))));

    let admin_request = fx.services.ledger.request_issue(&fx.admin, fx.request("111")).await;
    assert!(matches!(admin_request, Err(AppError::Authorization(_))));
}

#[tokio::test]
async fn test_request_for_unavailable_book_is_rejected() {
    let fx = setup().await;
    fx.stock("111", 1).await;
    fx.services
        .ledger
        .issue_book_to_user(&fx.admin, "111", fx.copy_for(&fx.second_reader))
        .await
        .unwrap();

    let result = fx.services.ledger.request_issue(&fx.reader, fx.request("111")).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_decision_preconditions() {
    let fx = setup().await;
    fx.stock("111", 1).await;
    let request = fx
        .services
        .ledger
        .request_issue(&fx.reader, fx.request("111"))
        .await
        .unwrap();

    let missing = fx.services.ledger.approve_issue(&fx.admin, 4242).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    let foreign = fx.services.ledger.approve_issue(&fx.other_admin, request.id).await;
    assert!(matches!(foreign, Err(AppError::Authorization(_))));

    let by_owner = fx.services.ledger.approve_issue(&fx.owner, request.id).await;
    assert!(matches!(by_owner, Err(AppError::Authorization(_))));

    fx.services.ledger.approve_issue(&fx.admin, request.id).await.unwrap();
    let twice = fx.services.ledger.disapprove_issue(&fx.admin, request.id).await;
    assert!(matches!(twice, Err(AppError::Validation(_))));

    // Status is checked before library ownership
    let processed = fx.services.ledger.approve_issue(&fx.other_admin, request.id).await;
    assert!(matches!(processed, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_update_cannot_shrink_below_issued() {
    let fx = setup().await;
    fx.stock("111", 3).await;
    for reader in [fx.reader, fx.second_reader] {
        fx.services
            .ledger
            .issue_book_to_user(&fx.admin, "111", fx.copy_for(&reader))
            .await
            .unwrap();
    }

    let update = |total| UpdateBook {
        library_id: fx.library,
        total_copies: total,
        metadata: BookMetadata {
            title: "Dune Messiah".to_string(),
            ..BookMetadata::default()
        },
    };

    let shrunk = fx.services.ledger.update_book(&fx.admin, "111", update(1)).await;
    assert!(matches!(shrunk, Err(AppError::Validation(_))));
    assert_eq!(fx.book("111").await.unwrap().title, "Dune");

    let book = fx.services.ledger.update_book(&fx.admin, "111", update(5)).await.unwrap();
    assert_eq!(book.total_copies, 5);
    assert_eq!(book.available_copies, 3);
    assert_eq!(book.title, "Dune Messiah");

    let book = fx.services.ledger.update_book(&fx.admin, "111", update(2)).await.unwrap();
    assert_eq!(book.available_copies, 0);
    assert_copies_consistent(&book);
}

#[tokio::test]
async fn test_restock_adds_copies() {
    let fx = setup().await;
    fx.stock("111", 2).await;
    fx.services
        .ledger
        .issue_book_to_user(&fx.admin, "111", fx.copy_for(&fx.reader))
        .await
        .unwrap();

    let stocked = fx
        .services
        .ledger
        .add_or_restock_book(&fx.admin, new_book("111", fx.library, 3))
        .await
        .unwrap();
    let Stocked::Restocked(book) = stocked else {
        panic!("expected a restock");
    };
    assert_eq!(book.total_copies, 5);
    assert_eq!(book.available_copies, 4);

    let zero = fx
        .services
        .ledger
        .add_or_restock_book(&fx.admin, new_book("111", fx.library, 0))
        .await;
    assert!(matches!(zero, Err(AppError::Validation(_))));

    let foreign = fx
        .services
        .ledger
        .add_or_restock_book(&fx.other_admin, new_book("111", fx.library, 1))
        .await;
    assert!(matches!(foreign, Err(AppError::Authorization(_))));
}

#[tokio::test]
async fn test_restock_overflow_is_rejected() {
    let fx = setup().await;
    fx.stock("111", 5).await;

    let result = fx
        .services
        .ledger
        .add_or_restock_book(&fx.admin, new_book("111", fx.library, i32::MAX))
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let book = fx.book("111").await.unwrap();
    assert_eq!((book.total_copies, book.available_copies), (5, 5));
}

#[tokio::test]
async fn test_remove_copy_then_book() {
    let fx = setup().await;
    fx.stock("111", 3).await;

    let removed = fx.services.ledger.remove_book(&fx.admin, "111", fx.library).await.unwrap();
    let RemovedCopy::Decremented(book) = removed else {
        panic!("expected one copy removed");
    };
    assert_eq!((book.total_copies, book.available_copies), (2, 2));

    fx.stock("222", 1).await;
    let removed = fx.services.ledger.remove_book(&fx.admin, "222", fx.library).await.unwrap();
    assert_eq!(removed, RemovedCopy::Deleted);
    assert!(fx.book("222").await.is_none());

    let missing = fx.services.ledger.remove_book(&fx.admin, "222", fx.library).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_remove_refused_while_every_copy_is_out() {
    let fx = setup().await;
    fx.stock("111", 1).await;
    fx.services
        .ledger
        .issue_book_to_user(&fx.admin, "111", fx.copy_for(&fx.reader))
        .await
        .unwrap();

    let result = fx.services.ledger.remove_book(&fx.admin, "111", fx.library).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    let book = fx.book("111").await.unwrap();
    assert_eq!((book.total_copies, book.available_copies), (1, 0));
}

#[tokio::test]
async fn test_search_reports_next_available_date() {
    let fx = setup().await;
    fx.stock("111", 1).await;
    let record = fx
        .services
        .ledger
        .issue_book_to_user(&fx.admin, "111", fx.copy_for(&fx.reader))
        .await
        .unwrap();

    fx.store
        .books_create(&Book {
            isbn: "333".to_string(),
            library_id: fx.library,
            title: "Lost Manuscript".to_string(),
            authors: String::new(),
            publisher: "Nobody".to_string(),
            version: String::new(),
            total_copies: 1,
            available_copies: 0,
        })
        .await
        .unwrap();

    let results = fx
        .services
        .ledger
        .search_books(&fx.second_reader, &BookQuery::default())
        .await
        .unwrap();
    assert_eq!(results.len(), 2);

    let dune = results.iter().find(|r| r.isbn == "111").unwrap();
    assert_eq!(
        dune.next_available_date,
        Some(NextAvailable::Expected(record.expected_return_date))
    );

    let lost = results.iter().find(|r| r.isbn == "333").unwrap();
    assert_eq!(lost.next_available_date, Some(NextAvailable::Unknown));
    assert_eq!(lost.author, "Unknown");
}

#[tokio::test]
async fn test_search_filters_and_scope() {
    let fx = setup().await;
    fx.stock("111", 1).await;
    fx.services
        .ledger
        .add_or_restock_book(&fx.other_admin, new_book("222", fx.other_library, 1))
        .await
        .unwrap();

    let query = BookQuery {
        title: Some("dUnE".to_string()),
        author: Some("herbert".to_string()),
        publisher: None,
    };
    let results = fx.services.ledger.search_books(&fx.reader, &query).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].library_id, fx.library);
    assert_eq!(results[0].next_available_date, None);

    let none = BookQuery {
        publisher: Some("Penguin".to_string()),
        ..BookQuery::default()
    };
    assert!(fx.services.ledger.search_books(&fx.reader, &none).await.unwrap().is_empty());

    let admin_search = fx.services.ledger.search_books(&fx.admin, &BookQuery::default()).await;
    assert!(matches!(admin_search, Err(AppError::Authorization(_))));
}

#[tokio::test]
async fn test_return_flow_restores_copy() {
    let fx = setup().await;
    fx.stock("111", 1).await;
    fx.services
        .ledger
        .issue_book_to_user(&fx.admin, "111", fx.copy_for(&fx.reader))
        .await
        .unwrap();

    let duplicate = fx
        .services
        .ledger
        .issue_book_to_user(&fx.admin, "111", fx.copy_for(&fx.reader))
        .await;
    assert!(matches!(duplicate, Err(AppError::Validation(_)) | Err(AppError::Conflict(_))));

    let announced = fx
        .services
        .ledger
        .request_return(&fx.reader, fx.request("111"))
        .await
        .unwrap();
    assert_eq!(announced.request_type, RequestType::Return);
    let again = fx.services.ledger.request_return(&fx.reader, fx.request("111")).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    let closed = fx
        .services
        .ledger
        .return_book(&fx.admin, "111", fx.copy_for(&fx.reader))
        .await
        .unwrap();
    assert_eq!(closed.issue_status, IssueStatus::Returned);
    assert_eq!(closed.return_approver_id, Some(fx.admin.user_id));
    assert!(closed.return_date.is_some());

    let book = fx.book("111").await.unwrap();
    assert_eq!(book.available_copies, 1);

    let requests = fx.services.ledger.status_issue(&fx.reader).await.unwrap();
    let return_request = requests.iter().find(|r| r.id == announced.id).unwrap();
    assert_eq!(return_request.status, RequestStatus::Approved);

    let not_open = fx
        .services
        .ledger
        .return_book(&fx.admin, "111", fx.copy_for(&fx.reader))
        .await;
    assert!(matches!(not_open, Err(AppError::NotFound(_))));

    let no_loan = fx.services.ledger.request_return(&fx.reader, fx.request("111")).await;
    assert!(matches!(no_loan, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_double_issue_to_same_reader_conflicts() {
    let fx = setup().await;
    fx.stock("111", 2).await;
    fx.services
        .ledger
        .issue_book_to_user(&fx.admin, "111", fx.copy_for(&fx.reader))
        .await
        .unwrap();

    let duplicate = fx
        .services
        .ledger
        .issue_book_to_user(&fx.admin, "111", fx.copy_for(&fx.reader))
        .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));
    assert_eq!(fx.book("111").await.unwrap().available_copies, 1);
}

#[tokio::test]
async fn test_issue_to_unknown_reader() {
    let fx = setup().await;
    fx.stock("111", 1).await;

    let result = fx
        .services
        .ledger
        .issue_book_to_user(
            &fx.admin,
            "111",
            ReaderCopy {
                user_id: 4242,
                library_id: fx.library,
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert_eq!(fx.book("111").await.unwrap().available_copies, 1);
}

#[tokio::test]
async fn test_list_requests_scoped_to_managed_libraries() {
    let fx = setup().await;
    fx.stock("111", 2).await;
    fx.services
        .ledger
        .request_issue(&fx.reader, fx.request("111"))
        .await
        .unwrap();

    let mine = fx.services.ledger.list_issue_requests(&fx.admin).await.unwrap();
    assert_eq!(mine.len(), 1);

    let theirs = fx.services.ledger.list_issue_requests(&fx.other_admin).await.unwrap();
    assert!(theirs.is_empty());

    let lonely = account(&fx.store, "lonely@example.org", Role::Admin, &[]).await;
    let result = fx.services.ledger.list_issue_requests(&lonely).await;
    assert!(matches!(result, Err(AppError::Authorization(_))));
}
