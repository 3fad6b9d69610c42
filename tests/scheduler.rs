mod common;

use common::{list, values_of};
use php_zval::builtins::exception::PhpException;
use php_zval::core::value::{Reference, Val};
use php_zval::runtime::scheduler::{Scheduler, SchedulerError};
use php_zval::vm::error::CollectingErrorHandler;
use php_zval::vm::variable_ops::SymbolTable;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

#[test]
fn test_task_ids_are_increasing() {
    Scheduler::run(|sched| async move {
        let a = sched.fork(async { Ok(Val::Null) });
        let b = sched.fork(async { Ok(Val::Null) });
        assert!(b > a);
        assert_eq!(sched.running_tasks(), 2);
        sched.wait(a, None).await;
        sched.wait(b, None).await;
        assert_eq!(sched.running_tasks(), 0);
        Ok(Val::Null)
    })
    .unwrap();
}

#[test]
fn test_yield_lets_sibling_run() {
    let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
    let shared = Rc::clone(&log);
    Scheduler::run(|sched| async move {
        let (la, lb) = (Rc::clone(&shared), Rc::clone(&shared));
        let (wa, wb) = (sched.clone(), sched.clone());
        let a = sched.fork(async move {
            la.borrow_mut().push("a1");
            wa.sched_yield().await;
            la.borrow_mut().push("a2");
            Ok(Val::Null)
        });
        let b = sched.fork(async move {
            lb.borrow_mut().push("b1");
            wb.sched_yield().await;
            lb.borrow_mut().push("b2");
            Ok(Val::Null)
        });
        sched.wait_multi(&[a, b]).await;
        Ok(Val::Null)
    })
    .unwrap();

    let log = log.borrow();
    let pos = |e: &str| log.iter().position(|x| *x == e).unwrap();
    assert_eq!(log.len(), 4);
    assert!(pos("a1") < pos("b1"));
    assert!(pos("b1") < pos("a2"));
    assert!(pos("b1") < pos("b2"));
}

#[test]
fn test_wait_multi_results_in_argument_order() {
    let results = Scheduler::run(|sched| async move {
        let worker = sched.clone();
        let slow = sched.fork(async move {
            worker.usleep(10_000).await;
            Ok(Val::from("slow"))
        });
        let fast = sched.fork(async { Ok(Val::from("fast")) });
        let failing = sched.fork(async { Err(PhpException::new("nope")) });
        let values = sched.wait_multi(&[slow, fast, failing, 12345]).await;
        Ok(list(
            values
                .into_iter()
                .map(|v| v.unwrap_or(Val::Bool(false)))
                .collect(),
        ))
    })
    .unwrap();
    assert_eq!(
        values_of(&results),
        vec![
            Val::from("slow"),
            Val::from("fast"),
            Val::Bool(false),
            Val::Bool(false)
        ]
    );
}

#[test]
fn test_wait_result_can_be_read_twice() {
    Scheduler::run(|sched| async move {
        let id = sched.fork(async { Ok(Val::Int(5)) });
        assert_eq!(sched.wait_result(id).await.unwrap(), Some(Val::Int(5)));
        assert_eq!(sched.wait_result(id).await.unwrap(), Some(Val::Int(5)));
        Ok(Val::Null)
    })
    .unwrap();
}

#[test]
fn test_wait_queue_push_and_unknown_ids() {
    Scheduler::run(|sched| async move {
        let done = sched.fork(async { Ok(Val::Int(1)) });
        sched.wait(done, None).await;

        let queue = sched.wait_queue_create(&[]);
        assert!(sched.wait_queue_empty(queue));
        assert!(!sched.wait_queue_push(queue, 999));
        assert!(!sched.wait_queue_push(queue + 100, done));
        assert!(sched.wait_queue_push(queue, done));
        assert!(sched.wait_queue_push(queue, done));
        assert!(!sched.wait_queue_empty(queue));

        assert_eq!(sched.wait_queue_next(queue, None).await, Some(done));
        assert_eq!(sched.wait_queue_next(queue, None).await, None);
        assert_eq!(sched.wait_queue_next(queue + 100, None).await, None);
        Ok(Val::Null)
    })
    .unwrap();
}

#[test]
fn test_wait_queue_timeout() {
    Scheduler::run(|sched| async move {
        let worker = sched.clone();
        let slow = sched.fork(async move {
            worker.usleep(50_000).await;
            Ok(Val::Null)
        });
        let queue = sched.wait_queue_create(&[slow]);
        assert_eq!(
            sched
                .wait_queue_next(queue, Some(Duration::from_millis(1)))
                .await,
            None
        );
        assert!(!sched.wait_queue_empty(queue));
        assert_eq!(sched.wait_queue_next(queue, None).await, Some(slow));
        Ok(Val::Null)
    })
    .unwrap();
}

#[test]
fn test_tasks_share_values_through_references() {
    let table = Rc::new(RefCell::new(SymbolTable::new()));
    table.borrow_mut().assign(b"total", Val::Int(0));
    let cell: Reference = table.borrow_mut().make_ref(b"total");

    Scheduler::run(|sched| async move {
        let mut ids = Vec::new();
        for step in 1..=4 {
            let cell = cell.clone();
            let worker = sched.clone();
            ids.push(sched.fork(async move {
                worker.sched_yield().await;
                // read-modify-write with no suspension in between is atomic
                let current = match cell.get() {
                    Val::Int(i) => i,
                    _ => 0,
                };
                cell.set(Val::Int(current + step));
                Ok(Val::Null)
            }));
        }
        sched.wait_multi(&ids).await;
        Ok(Val::Null)
    })
    .unwrap();

    let mut errors = CollectingErrorHandler::new();
    assert_eq!(table.borrow().read(b"total", &mut errors), Val::Int(10));
    assert!(errors.is_empty());
}

#[test]
fn test_pending_tasks_are_dropped_with_main() {
    let started = Instant::now();
    let value = Scheduler::run(|sched| async move {
        let worker = sched.clone();
        sched.fork(async move {
            worker.usleep(30_000_000).await;
            Ok(Val::Null)
        });
        sched.sched_yield().await;
        Ok(Val::Int(1))
    })
    .unwrap();
    assert_eq!(value, Val::Int(1));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn test_uncaught_exception_surfaces_as_error() {
    let err = Scheduler::run(|_| async { Err(PhpException::with_class("RuntimeException", "bad")) })
        .unwrap_err();
    match err {
        SchedulerError::Uncaught(e) => {
            assert_eq!(e.class_name(), "RuntimeException");
            assert_eq!(e.get_message(), "bad");
        }
        other => panic!("unexpected {}", other),
    }
}

#[test]
fn test_panicking_task_still_completes() {
    let value = Scheduler::run(|sched| async move {
        let id = sched.fork(async {
            let empty: Vec<Val> = Vec::new();
            Ok(empty[3].clone())
        });
        let sibling = sched.fork(async { Ok(Val::Int(7)) });
        assert!(sched.wait(id, Some(Duration::from_secs(5))).await);
        let err = sched.wait_result(id).await.unwrap_err();
        assert_eq!(err.class_name(), "Error");
        assert!(err.get_message().starts_with(&format!("Task {} did not complete", id)));
        sched.wait_result(sibling).await.map(|v| v.unwrap_or(Val::Null))
    })
    .unwrap();
    assert_eq!(value, Val::Int(7));
}
