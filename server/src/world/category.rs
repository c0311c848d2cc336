//
// Copyright 2025 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

/// Entity categories, each with its own live registry and save files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Items,
    Mobiles,
    Guilds,
    Regions,
}

impl Category {
    /// Load order: guild and region bodies reference mobiles and items.
    pub const LOAD_ORDER: [Category; 4] = [
        Category::Mobiles,
        Category::Items,
        Category::Guilds,
        Category::Regions,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Category::Items => "Items",
            Category::Mobiles => "Mobiles",
            Category::Guilds => "Guilds",
            Category::Regions => "Regions",
        }
    }

    /// Items and mobiles are polymorphic and carry a type table. Guilds and
    /// regions have a single registered type.
    pub const fn has_type_table(self) -> bool {
        matches!(self, Category::Items | Category::Mobiles)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
