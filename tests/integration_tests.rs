mod integration {
    mod action_tests;
    mod app_tests;
    mod config_tests;
    mod dedup_tests;
    mod mbox_tests;
}
