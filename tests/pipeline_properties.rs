use proptest::prelude::*;
use ratio_pipeline::pipeline::stages::{
    aggregate_by_category, filter_by_date, inner_join, sort_by_ratio_desc,
};
use ratio_pipeline::pipeline::Table;

const DATES: [&str; 3] = ["17.14.11", "17.15.11", "17.16.11"];

fn videos_table(rows: &[(usize, i64, u32, u32)]) -> Table {
    let mut table = Table::new(["video_id", "trending_date", "category_id", "likes", "dislikes"]);
    for (index, (date, category_id, likes, dislikes)) in rows.iter().enumerate() {
        table
            .push_row(vec![
                format!("v{index}"),
                DATES[*date].to_string(),
                category_id.to_string(),
                likes.to_string(),
                dislikes.to_string(),
            ])
            .unwrap();
    }
    table
}

fn categories_table(ids: &[i64]) -> Table {
    let mut table = Table::new(["category", "id"]);
    for id in ids {
        // Two ids share a name so grouping merges categories
        table
            .push_row(vec![format!("Category {}", id % 3), id.to_string()])
            .unwrap();
    }
    table
}

fn video_rows() -> impl Strategy<Value = Vec<(usize, i64, u32, u32)>> {
    prop::collection::vec((0..DATES.len(), 0i64..8, 0u32..5_000, 0u32..500), 0..60)
}

fn unique_ids() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::btree_set(0i64..8, 0..8).prop_map(|ids| ids.into_iter().collect())
}

fn column_sum(table: &Table, column: &str) -> u64 {
    table
        .parse_column(column, str::parse::<u64>)
        .unwrap()
        .into_iter()
        .sum()
}

proptest! {
    #[test]
    fn join_never_exceeds_filter_output(
        rows in video_rows(),
        ids in unique_ids(),
        date in 0..DATES.len(),
    ) {
        let vids = filter_by_date(&videos_table(&rows), DATES[date]).unwrap();
        let joined = inner_join(&vids, &categories_table(&ids)).unwrap();
        prop_assert!(joined.len() <= vids.len());
    }

    #[test]
    fn filter_keeps_exactly_the_matching_rows(rows in video_rows(), date in 0..DATES.len()) {
        let vids = filter_by_date(&videos_table(&rows), DATES[date]).unwrap();
        let expected = rows.iter().filter(|row| row.0 == date).count();
        prop_assert_eq!(vids.len(), expected);
        prop_assert!(vids.rows().iter().all(|row| row[1] == DATES[date]));
    }

    #[test]
    fn aggregation_conserves_likes_and_dislikes(rows in video_rows(), ids in unique_ids()) {
        let joined = inner_join(&videos_table(&rows), &categories_table(&ids)).unwrap();
        let aggregates = aggregate_by_category(&joined).unwrap();

        let likes: u64 = aggregates.iter().map(|a| a.likes).sum();
        let dislikes: u64 = aggregates.iter().map(|a| a.dislikes).sum();
        prop_assert_eq!(likes, column_sum(&joined, "likes"));
        prop_assert_eq!(dislikes, column_sum(&joined, "dislikes"));
    }

    #[test]
    fn sort_is_a_stable_descending_permutation(
        ratios in prop::collection::vec(
            prop_oneof![
                (0u8..4).prop_map(|n| format!("{:?}", f64::from(n))),
                Just("inf".to_string()),
                Just("NaN".to_string()),
                (0.0f64..100.0).prop_map(|f| format!("{f:?}")),
            ],
            0..40,
        )
    ) {
        let mut input = Table::new(["category", "ratio_likes_dislikes"]);
        for (index, ratio) in ratios.iter().enumerate() {
            input.push_row(vec![index.to_string(), ratio.clone()]).unwrap();
        }

        let sorted = sort_by_ratio_desc(&input).unwrap();

        let mut before: Vec<Vec<String>> = input.rows().to_vec();
        let mut after: Vec<Vec<String>> = sorted.rows().to_vec();
        before.sort();
        after.sort();
        prop_assert_eq!(before, after);

        let keyed: Vec<(f64, usize)> = sorted
            .rows()
            .iter()
            .map(|row| (row[1].parse::<f64>().unwrap(), row[0].parse::<usize>().unwrap()))
            .collect();
        for pair in keyed.windows(2) {
            let (a, a_index) = pair[0];
            let (b, b_index) = pair[1];
            // NaN rows only ever follow other NaN rows
            prop_assert!(!a.is_nan() || b.is_nan());
            if !b.is_nan() {
                prop_assert!(a >= b);
            }
            let same = (a.is_nan() && b.is_nan()) || a == b;
            if same {
                prop_assert!(a_index < b_index);
            }
        }
    }
}
