use std::{
    fs,
    io::{self, BufRead, IsTerminal, Write},
    path::{Path, PathBuf},
};

use annot_core::{
    Annotator, AnnotatorConfig, ConfigOverrides, EmptySource, LookupSource, NormalizationFlags,
};
use annot_dict::{TrigramDictionary, TsvDictionary};
use anyhow::Context;
use clap::Parser;

/// 基于词典的文本注释：输出 `[{begin, end, obj}]`（码点区间，半开）。
#[derive(Debug, Parser)]
#[command(name = "annot_cli", version)]
struct Args {
    /// 主词典（TSV：label<TAB>identifier）
    #[arg(long)]
    dict: Option<PathBuf>,
    /// 用户词典（固定三元组打分），近似模式下作为第二查询源
    #[arg(long)]
    user_dict: Option<PathBuf>,
    /// 默认配置（TOML）
    #[arg(long)]
    config: Option<PathBuf>,
    /// exact | approximate
    #[arg(long)]
    method: Option<String>,
    #[arg(long)]
    threshold: Option<f64>,
    /// exact | cosine | dice | jaccard | overlap
    #[arg(long)]
    measure: Option<String>,
    #[arg(long)]
    top_n: Option<usize>,
    #[arg(long)]
    min_tokens: Option<usize>,
    #[arg(long)]
    max_tokens: Option<usize>,
    /// 输出附带 label 与 score
    #[arg(long)]
    verbose: bool,
    /// 词典 key 已小写化
    #[arg(long)]
    lowercased: bool,
    /// 词典 key 中的 `-` 已替换为空格
    #[arg(long)]
    hyphen_replaced: bool,
    /// 词典 key 已词干化
    #[arg(long)]
    stemmed: bool,
    /// 直接注释这段文本；省略时逐行读取 stdin
    #[arg(long)]
    text: Option<String>,
}

impl Args {
    fn flags(&self) -> NormalizationFlags {
        NormalizationFlags {
            lowercased: self.lowercased,
            hyphen_replaced: self.hyphen_replaced,
            stemmed: self.stemmed,
        }
    }

    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            min_tokens: self.min_tokens,
            max_tokens: self.max_tokens,
            matching_method: self.method.clone(),
            threshold: self.threshold,
            top_n: self.top_n,
            measure: self.measure.clone(),
            verbose: self.verbose.then_some(true),
            ..ConfigOverrides::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let stored = load_config(args.config.as_deref())?;
    let dict_path = args.dict.clone().unwrap_or_else(default_dict_path);
    let dict = TsvDictionary::from_path(&dict_path, args.flags())
        .with_context(|| format!("加载词典 {} 失败", dict_path.display()))?
        .with_name("base");
    log::info!("词典 {}：{} 个 key", dict_path.display(), dict.len());

    match &args.user_dict {
        Some(path) => {
            let user = TsvDictionary::from_path(path, args.flags())
                .with_context(|| format!("加载用户词典 {} 失败", path.display()))?
                .with_name("user");
            let annotator = Annotator::with_config(dict, TrigramDictionary::new(user), stored)?;
            run(&annotator, &args)
        }
        None => {
            let annotator = Annotator::with_config(dict, EmptySource, stored)?;
            run(&annotator, &args)
        }
    }
}

fn default_dict_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("asset").join("dict.tsv")
}

/// 读取 TOML 默认配置；未指定时使用内置默认值。
fn load_config(path: Option<&Path>) -> anyhow::Result<AnnotatorConfig> {
    let Some(path) = path else {
        return Ok(AnnotatorConfig::default());
    };
    let contents = fs::read_to_string(path)
        .with_context(|| format!("读取配置 {} 失败", path.display()))?;
    let overrides: ConfigOverrides = toml::from_str(&contents)
        .with_context(|| format!("解析配置 {} 失败", path.display()))?;
    let config = AnnotatorConfig::default().merge(&overrides)?;
    log::info!("已加载配置 {}", path.display());
    Ok(config)
}

fn run<A, B>(annotator: &Annotator<A, B>, args: &Args) -> anyhow::Result<()>
where
    A: LookupSource,
    B: LookupSource,
{
    let overrides = args.overrides();
    let mut out = io::stdout().lock();

    if let Some(text) = &args.text {
        return annotate_line(annotator, text, &overrides, &mut out);
    }

    let stdin = io::stdin();
    let interactive = stdin.is_terminal();
    if interactive {
        writeln!(out, "annot demo | 每行一段文本，回车注释。输入 :q 退出。")?;
    }
    let mut line = String::new();
    loop {
        line.clear();
        if interactive {
            write!(out, "text>")?;
            out.flush()?;
        }
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim_end_matches(['\r', '\n']);
        if interactive && matches!(input, ":q" | ":quit" | ":exit") {
            break;
        }
        annotate_line(annotator, input, &overrides, &mut out)?;
    }

    let stats = annotator.sources().similar_cache().stats();
    log::debug!("近似查询缓存：命中 {} / 未命中 {}", stats.hits, stats.misses);
    Ok(())
}

fn annotate_line<A, B>(
    annotator: &Annotator<A, B>,
    text: &str,
    overrides: &ConfigOverrides,
    out: &mut impl Write,
) -> anyhow::Result<()>
where
    A: LookupSource,
    B: LookupSource,
{
    let report = annotator.annotate_with_report(text, overrides)?;
    for u in &report.unavailable {
        log::warn!("查询源 {} 不可用（{}）：{}", u.source, u.query, u.reason);
    }
    if report.truncated {
        log::warn!("结果被截断（候选数上限或时间预算）");
    }
    writeln!(out, "{}", serde_json::to_string(&report.annotations)?)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use annot_core::MatchingMethod;

    #[test]
    fn bundled_config_and_dictionary_load() {
        let asset = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("asset");
        let config = load_config(Some(asset.join("annot.toml").as_path())).unwrap();
        assert_eq!(config, AnnotatorConfig::default());
        let dict = TsvDictionary::from_path(default_dict_path(), NormalizationFlags::default()).unwrap();
        assert!(!dict.is_empty());
    }

    #[test]
    fn flags_become_overrides() {
        let args = Args::try_parse_from([
            "annot_cli",
            "--method",
            "approximate",
            "--threshold",
            "0.7",
            "--top-n",
            "2",
            "--lowercased",
        ])
        .unwrap();
        let merged = AnnotatorConfig::default().merge(&args.overrides()).unwrap();
        assert_eq!(merged.matching_method, MatchingMethod::Approximate);
        assert_eq!(merged.threshold, 0.7);
        assert_eq!(merged.top_n, 2);
        assert!(!merged.verbose);
        assert!(args.flags().lowercased);
    }

    #[test]
    fn annotates_one_line_as_json() {
        let dict = TsvDictionary::from_tsv_str("NF-kappa B\tID1\n", NormalizationFlags::default()).unwrap();
        let annotator = Annotator::new(dict, EmptySource);
        let mut buf = Vec::new();
        annotate_line(&annotator, "NF-kappa B activity", &ConfigOverrides::default(), &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "[{\"begin\":0,\"end\":10,\"obj\":\"ID1\"}]\n");
    }
}
