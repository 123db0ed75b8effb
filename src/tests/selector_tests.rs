//! tests/selector_tests.rs
//! Rotación de cuentas, exclusiones de la corrida y cuota en vivo.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use actix_rt::test;

    use crate::models::account_model::AccountState;
    use crate::services::account_selector::{AccountSelector, Selection};
    use crate::services::counter_store::DailyCounterStore;
    use crate::tests::support::{account, date, movable_today, MemoryCounterStore, A, B, C};

    async fn select_id(selector: &mut AccountSelector) -> Option<String> {
        match selector.select().await.unwrap() {
            Selection::Selected(account) => Some(account.id),
            _ => None,
        }
    }

    #[test]
    async fn three_accounts_limit_two_exhaust_on_seventh_selection() {
        let counters = Arc::new(MemoryCounterStore::new());
        let accounts = vec![account(A, None), account(B, None), account(C, None)];
        let mut selector = AccountSelector::new(accounts, 2, counters.clone());

        let mut picked = Vec::new();
        let mut per_account: HashMap<String, u32> = HashMap::new();
        for _ in 0..6 {
            let id = select_id(&mut selector).await.expect("hay cuota disponible");
            counters.increment(&id, 1).await.unwrap();
            let n = per_account.entry(id.clone()).or_default();
            *n += 1;
            assert!(*n <= 2, "{} seleccionada una tercera vez", id);
            picked.push(id);
        }

        assert_eq!(picked, vec![A, B, C, A, B, C]);
        assert!(matches!(selector.select().await.unwrap(), Selection::Exhausted));
    }

    #[test]
    async fn no_accounts_is_distinct_from_exhaustion() {
        let counters = Arc::new(MemoryCounterStore::new());
        let mut selector = AccountSelector::new(vec![], 10, counters);
        assert!(matches!(selector.select().await.unwrap(), Selection::NoAccounts));
    }

    #[test]
    async fn rate_limited_account_is_skipped_for_the_rest_of_the_run() {
        let counters = Arc::new(MemoryCounterStore::new());
        let mut selector =
            AccountSelector::new(vec![account(A, None), account(B, None)], 100, counters);

        selector.mark_rate_limited(A);
        assert_eq!(selector.state(A), Some(AccountState::RateLimited));
        for _ in 0..4 {
            assert_eq!(select_id(&mut selector).await.as_deref(), Some(B));
        }
    }

    #[test]
    async fn failed_is_terminal_and_not_downgraded() {
        let counters = Arc::new(MemoryCounterStore::new());
        let mut selector = AccountSelector::new(vec![account(A, None)], 100, counters);

        selector.mark_failed(A);
        selector.mark_rate_limited(A);
        assert_eq!(selector.state(A), Some(AccountState::Failed));
        assert!(matches!(selector.select().await.unwrap(), Selection::Exhausted));
    }

    #[test]
    async fn per_account_limit_overrides_campaign_default() {
        let counters = Arc::new(MemoryCounterStore::new());
        let mut selector = AccountSelector::new(
            vec![account(A, Some(1)), account(B, None)],
            3,
            counters.clone(),
        );

        let mut picked = Vec::new();
        while let Some(id) = select_id(&mut selector).await {
            counters.increment(&id, 1).await.unwrap();
            picked.push(id);
        }
        assert_eq!(picked, vec![A, B, B, B]);
    }

    #[test]
    async fn quota_is_reevaluated_after_date_rollover() {
        let (clock, today) = movable_today(date(2025, 6, 1));
        let counters = Arc::new(MemoryCounterStore::with_today(today));
        let mut selector = AccountSelector::new(vec![account(A, None)], 1, counters.clone());

        assert_eq!(select_id(&mut selector).await.as_deref(), Some(A));
        counters.increment(A, 1).await.unwrap();
        assert!(matches!(selector.select().await.unwrap(), Selection::Exhausted));

        *clock.lock().unwrap() = date(2025, 6, 2);
        assert_eq!(select_id(&mut selector).await.as_deref(), Some(A));
    }

    #[test]
    async fn counters_from_earlier_runs_count_against_quota() {
        let counters = Arc::new(MemoryCounterStore::new());
        counters.increment(A, 2).await.unwrap();
        let mut selector =
            AccountSelector::new(vec![account(A, None), account(B, None)], 2, counters);

        assert_eq!(select_id(&mut selector).await.as_deref(), Some(B));
        assert_eq!(select_id(&mut selector).await.as_deref(), Some(B));
    }
}
