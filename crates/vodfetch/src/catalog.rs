//! Static registry of prompt templates and documentation resources offered
//! to remote callers.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PromptTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub content: &'static str,
}

impl PromptTemplate {
    /// Substitutes `{url}` and `{output_path}`.
    pub fn render(&self, url: &str, output_path: &str) -> String {
        self.content
            .replace("{url}", url)
            .replace("{output_path}", output_path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resource {
    pub uri: &'static str,
    pub content: &'static str,
}

const PROMPTS: &[PromptTemplate] = &[
    PromptTemplate {
        id: "download_video",
        name: "Download video",
        description: "Prompt template for downloading a video from an m3u8 link",
        content: "Please download the video at this m3u8 link: {url}, and save it to {output_path}.",
    },
    PromptTemplate {
        id: "analyze_video",
        name: "Analyze video",
        description: "Prompt template for analyzing an m3u8 video",
        content: "Please analyze the content of this m3u8 link: {url}, and tell me the basic information about the video.",
    },
];

const RESOURCES: &[Resource] = &[
    Resource {
        uri: "readme",
        content: r#"# M3U8 video download service

Downloads, decrypts and merges m3u8 videos:

1. Analyze an m3u8 manifest
2. Download and decrypt an m3u8 video
3. Check download status
4. Clean temporary files

## Usage

1. Run `analyze` to inspect a manifest
2. Run `download` to fetch and merge the video
3. Run `status` to inspect the segment workspace
4. Run `clean` to remove temporary segment files
"#,
    },
    Resource {
        uri: "usage_example",
        content: r#"# Usage example

    vodfetch analyze https://cdn.example.com/vod/index.m3u8
    vodfetch download https://cdn.example.com/vod/index.m3u8 -o out/video.mp4 --concurrency 8
    vodfetch status
    vodfetch clean
"#,
    },
];

pub fn prompts() -> &'static [PromptTemplate] {
    PROMPTS
}

pub fn find_prompt(id: &str) -> Option<&'static PromptTemplate> {
    PROMPTS.iter().find(|p| p.id == id)
}

pub fn resources() -> &'static [Resource] {
    RESOURCES
}

pub fn find_resource(uri: &str) -> Option<&'static Resource> {
    RESOURCES.iter().find(|r| r.uri == uri)
}
