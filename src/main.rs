use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use inbox_triage::{cli, config, llm, logging, reader, store, triage};
use cli::{Cli, Commands, FetchArgs};
use config::{mask_secret, Config};
use llm::{LlmClient, ProviderTable};
use reader::ReaderClient;
use store::TriageStore;
use triage_common::{Action, Item, TriageSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let mut config = Config::load(cli.provider).context("設定の読み込みに失敗しました")?;
    if let Some(store) = cli.store {
        config.store_path = Some(store);
    }

    match cli.command {
        Commands::Verify => {
            let client = ReaderClient::new(config.reader_token()?)?;
            if client.verify_token().await? {
                println!("✔ トークンは有効です");
            } else {
                bail!("トークンが無効です");
            }
        }

        Commands::Fetch { fetch, all, output } => {
            println!("📥 inbox-triage - 記事取得\n");

            let items = fetch_items(&config, &fetch).await?;
            let store = open_store(&config)?;
            let shown = if all {
                items.clone()
            } else {
                triage::untriaged_items(&items, &store)
            };

            for item in &shown {
                let mark = match store.get_item(&item.id) {
                    Some(entry) => entry.action.as_str(),
                    None => "-",
                };
                println!(
                    "{:<12} {} ({}, {})",
                    mark,
                    item.title,
                    item.category,
                    item.reading_time_label()
                );
            }
            println!(
                "\n✔ {}件取得（未判定 {}件）",
                items.len(),
                items.iter().filter(|i| !store.has_triaged(&i.id)).count()
            );

            if let Some(output) = output {
                let json = serde_json::to_string_pretty(&items)?;
                std::fs::write(&output, json)?;
                println!("✔ 保存: {}", output.display());
            }
        }

        Commands::Triage { fetch, batch_size, limit, variant, model } => {
            println!("🤖 inbox-triage - LLMトリアージ\n");

            let mut settings = config.llm_settings();
            if let Some(variant) = variant {
                settings.prompt_variant = variant;
            }
            if model.is_some() {
                settings.model = model;
            }
            let client = LlmClient::new(&settings, &ProviderTable::builtin())?;

            println!("[1/3] 記事を取得中...");
            let items = fetch_items(&config, &fetch).await?;
            let mut store = open_store(&config)?;
            let pending = take_limit(triage::untriaged_items(&items, &store), limit);
            println!("✔ {}件中 未判定 {}件\n", items.len(), pending.len());

            if pending.is_empty() {
                println!("✓ 未判定の記事はありません");
                return Ok(());
            }

            println!(
                "[2/3] LLMで判定中... ({} / {})",
                client.provider(),
                client.model()
            );
            let batch_size = batch_size.unwrap_or(config.batch_size);
            let summary = triage::run_llm_triage(&client, &mut store, &pending, batch_size, |n, total| {
                println!("  - バッチ {}/{}", n, total);
            })
            .await?;
            println!("✔ 判定 {}件（対象外 {}件）\n", summary.applied, summary.skipped);

            println!("[3/3] 保存中...");
            let path = store.path().to_path_buf();
            store.close()?;
            println!("✔ 保存: {}", path.display());
            println!("\n✅ トリアージ完了（`inbox-triage push` でReaderに反映）");
        }

        Commands::Manual { fetch, limit } => {
            println!("✍️  inbox-triage - 手動トリアージ\n");

            let items = fetch_items(&config, &fetch).await?;
            let mut store = open_store(&config)?;
            let pending = take_limit(triage::untriaged_items(&items, &store), limit);

            let summary = triage::manual::run_manual_triage(&mut store, &pending)?;
            store.close()?;
            println!(
                "\n✔ 判定 {}件 / スキップ {}件",
                summary.decided, summary.skipped
            );
        }

        Commands::Export { fetch, items, output, prompt, variant, all } => {
            let items = match items {
                Some(path) => {
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("{} を読めません", path.display()))?;
                    serde_json::from_str::<Vec<Item>>(&content)?
                }
                None => fetch_items(&config, &fetch).await?,
            };
            let items = if all {
                items
            } else {
                triage::untriaged_items(&items, &open_store(&config)?)
            };

            let json = triage_common::items_json(&items)?;
            let text = if prompt {
                let variant = variant.unwrap_or(config.prompt_variant);
                triage_common::render_prompt(variant, &json)
            } else {
                json
            };

            match output {
                Some(path) => {
                    std::fs::write(&path, text)?;
                    println!("✔ {}件を書き出し: {}", items.len(), path.display());
                }
                None => println!("{}", text),
            }
        }

        Commands::Import { input } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("{} を読めません", input.display()))?;
            let mut store = open_store(&config)?;
            let summary = triage::apply_results(&mut store, &text, TriageSource::Manual)?;
            store.close()?;
            println!("✔ {}", summary);
        }

        Commands::Push { fetch, notes, dry_run } => {
            println!("📤 inbox-triage - Readerへ反映\n");

            let client = ReaderClient::new(config.reader_token()?)?;

            println!("[1/3] 記事を取得中...");
            let days = fetch.days.unwrap_or(config.days_ago);
            let location = fetch.location.clone().unwrap_or_else(|| config.location.clone());
            let items = client.fetch_inbox_items(days, &location).await?;
            println!("✔ {}件\n", items.len());

            println!("[2/3] 更新内容を作成中...");
            let store = open_store(&config)?;
            let updates = triage::build_updates(&items, &store, notes);
            println!("✔ {}件\n", updates.len());

            if updates.is_empty() {
                println!("✓ 反映する判定はありません");
                return Ok(());
            }

            if dry_run {
                for update in &updates {
                    println!("{} {}", update.id, serde_json::to_string(update)?);
                }
                return Ok(());
            }

            println!("[3/3] 反映中...");
            let pb = ProgressBar::new(updates.len() as u64);
            pb.set_style(
                ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
                    .context("progress template")?,
            );

            let (handle, mut rx) = triage::spawn_batch_update(client, updates);
            while let Some(progress) = rx.recv().await {
                pb.set_position(progress.current as u64);
                if !progress.success {
                    pb.println(format!("✗ {}", progress.id));
                }
            }
            pb.finish_and_clear();

            let result = handle.await.context("一括更新タスクが異常終了しました")?;
            println!(
                "✔ 成功 {}件 / 失敗 {}件（全{}件）",
                result.success, result.failed, result.total
            );
            for failure in &result.errors {
                println!("  ✗ {}: {}", failure.id, failure.error);
            }
        }

        Commands::Status => {
            let store = open_store(&config)?;
            println!("ストア: {}", store.path().display());
            println!("判定済み: {}件", store.len());
            for action in Action::ALL {
                println!("  {:<14} {}", action.as_str(), store.count_by_action(action));
            }
            let llm = store
                .iter()
                .filter(|(_, e)| e.source == TriageSource::Llm)
                .count();
            println!("  (LLM {}件 / 手動 {}件)", llm, store.len() - llm);
            if !store.is_empty() {
                println!("最終更新: {}", store.updated_at().to_rfc3339());
            }
        }

        Commands::Config { set_token, show } => {
            let mut file_config = Config::load_file()?;

            if let Some(token) = set_token {
                file_config.set_reader_token(token)?;
                println!("✔ トークンを設定しました");
            }

            if show {
                println!("設定ファイル: {}", Config::config_path()?.display());
                println!(
                    "Readwiseトークン: {}",
                    config
                        .readwise_token
                        .as_deref()
                        .map(mask_secret)
                        .unwrap_or_else(|| "(未設定)".into())
                );
                println!("LLMプロバイダ: {}", config.llm_provider);
                println!(
                    "LLMモデル: {}",
                    config.llm_model.as_deref().unwrap_or("(デフォルト)")
                );
                println!(
                    "LLM APIキー: {}",
                    config
                        .llm_api_key
                        .as_deref()
                        .map(mask_secret)
                        .unwrap_or_else(|| "(未設定)".into())
                );
                println!("プロンプト: {}", config.prompt_variant);
                println!("取得期間: {}日 / 場所: {}", config.days_ago, config.location);
                println!("ストア: {}", config.store_path()?.display());
            }
        }
    }

    Ok(())
}

async fn fetch_items(config: &Config, args: &FetchArgs) -> anyhow::Result<Vec<Item>> {
    let client = ReaderClient::new(config.reader_token()?)?;
    let days = args.days.unwrap_or(config.days_ago);
    let location = args.location.as_deref().unwrap_or(&config.location);
    Ok(client.fetch_inbox_items(days, location).await?)
}

fn open_store(config: &Config) -> anyhow::Result<TriageStore> {
    let path = config.store_path()?;
    TriageStore::load(&path).with_context(|| format!("ストアを開けません: {}", path.display()))
}

fn take_limit(items: Vec<Item>, limit: Option<usize>) -> Vec<Item> {
    match limit {
        Some(n) => items.into_iter().take(n).collect(),
        None => items,
    }
}
