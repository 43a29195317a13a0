use crate::llm::Provider;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use triage_common::PromptVariant;

#[derive(Parser)]
#[command(name = "inbox-triage")]
#[command(about = "あとで読むサービスの受信箱トリアージツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力 (-v: info, -vv: debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// LLMプロバイダ（設定・環境変数より優先）
    #[arg(long, global = true)]
    pub provider: Option<Provider>,

    /// トリアージストアのファイル
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,
}

/// 記事の取得条件
#[derive(Args, Clone, Debug, Default)]
pub struct FetchArgs {
    /// 何日前以降に更新された記事を対象にするか（デフォルト: 設定値）
    #[arg(short, long)]
    pub days: Option<u32>,

    /// 取得する場所 (new/later/shortlist/archive/feed)
    #[arg(short, long)]
    pub location: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Readwiseトークンを確認
    Verify,

    /// 記事を取得して一覧表示
    Fetch {
        #[command(flatten)]
        fetch: FetchArgs,

        /// 判定済みの記事も表示
        #[arg(short, long)]
        all: bool,

        /// 取得結果をJSONで保存
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// LLMで未判定の記事をトリアージ
    Triage {
        #[command(flatten)]
        fetch: FetchArgs,

        /// バッチサイズ（一度にLLMへ渡す件数）
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// 処理する最大件数
        #[arg(long)]
        limit: Option<usize>,

        /// プロンプト (full/lean)
        #[arg(long)]
        variant: Option<PromptVariant>,

        /// モデル名を上書き
        #[arg(short, long)]
        model: Option<String>,
    },

    /// 対話式で手動トリアージ
    Manual {
        #[command(flatten)]
        fetch: FetchArgs,

        /// 処理する最大件数
        #[arg(long)]
        limit: Option<usize>,
    },

    /// 未判定の記事をJSON/プロンプトとして書き出し（任意のLLMチャットに貼り付け用）
    Export {
        #[command(flatten)]
        fetch: FetchArgs,

        /// APIの代わりに `fetch --output` で保存したJSONを使う
        #[arg(long)]
        items: Option<PathBuf>,

        /// 出力ファイル（省略時は標準出力）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// プロンプトに埋め込んで出力
        #[arg(short, long)]
        prompt: bool,

        /// プロンプト (full/lean)
        #[arg(long)]
        variant: Option<PromptVariant>,

        /// 判定済みの記事も含める
        #[arg(short, long)]
        all: bool,
    },

    /// LLMチャットの回答（判定結果JSON）をストアに取り込み
    Import {
        /// 回答テキストのファイル
        #[arg(required = true)]
        input: PathBuf,
    },

    /// 判定をReaderに反映
    Push {
        #[command(flatten)]
        fetch: FetchArgs,

        /// 判定理由をノートとして送る
        #[arg(long)]
        notes: bool,

        /// 送信せずに内容だけ表示
        #[arg(long)]
        dry_run: bool,
    },

    /// ストアの集計を表示
    Status,

    /// 設定を表示/編集
    Config {
        /// Readwiseトークンを設定
        #[arg(long)]
        set_token: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}
