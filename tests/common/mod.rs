#![allow(dead_code)]

use ratio_pipeline::config::{Config, RunParameters};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const SCENARIO_VIDEOS: &str = "\
video_id,trending_date,title,category_id,views,likes,dislikes
v1,2018-01-01,\"Song, live\",1,1000,100,10
v2,2018-01-01,Another song,1,900,50,5
v3,2018-01-02,Speedrun,2,500,10,20
";

pub const SCENARIO_TAXONOMY: &str = r#"{
  "kind": "youtube#videoCategoryListResponse",
  "etag": "\"ld9biNPKjAjgjV7EZ4EKeEGrhao/1v2mrzYSYG6onNLt2qTj13hkQZk\"",
  "items": [
    { "kind": "youtube#videoCategory", "etag": "a", "id": "1", "snippet": { "channelId": "UC", "title": "Music", "assignable": true } },
    { "kind": "youtube#videoCategory", "etag": "b", "id": "2", "snippet": { "channelId": "UC", "title": "Gaming", "assignable": true } }
  ]
}"#;

pub const SCENARIO_OUTPUT: &str =
    "category,likes,dislikes,ratio_likes_dislikes\nMusic,150,15,10.0\n";

/// Zip `csv` as the single entry of an archive, like the published datasets
pub fn write_zip_dataset(dir: &Path, csv: &str) -> PathBuf {
    let path = dir.join("USvideos.csv.zip");
    let file = std::fs::File::create(&path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    writer
        .start_file(
            "USvideos.csv",
            zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated),
        )
        .unwrap();
    writer.write_all(csv.as_bytes()).unwrap();
    writer.finish().unwrap();
    path
}

pub fn write_gzip_dataset(dir: &Path, csv: &str) -> PathBuf {
    let path = dir.join("USvideos.csv.gz");
    let file = std::fs::File::create(&path).unwrap();
    let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    encoder.write_all(csv.as_bytes()).unwrap();
    encoder.finish().unwrap();
    path
}

pub fn write_taxonomy(dir: &Path, json: &str) -> PathBuf {
    let path = dir.join("US_category_id.json");
    std::fs::write(&path, json).unwrap();
    path
}

/// Config rooted in `dir` with the scenario inputs and `date`
pub fn scenario_config(dir: &Path, date: &str, run_scoped: bool) -> Config {
    let mut config = Config::default();
    config.storage.pipeline_path = dir.join("tmp");
    config.storage.run_scoped = run_scoped;
    config.run = RunParameters {
        path_vids: Some(write_zip_dataset(dir, SCENARIO_VIDEOS)),
        date: Some(date.to_string()),
        path_cats: Some(write_taxonomy(dir, SCENARIO_TAXONOMY)),
        path_output: Some(dir.join("ratio.csv").display().to_string()),
    };
    config
}

pub fn write_plain_dataset(dir: &Path, csv: &str) -> PathBuf {
    let path = dir.join("USvideos.csv");
    std::fs::write(&path, csv).unwrap();
    path
}
